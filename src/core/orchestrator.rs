//! 编排器：根据最新 State 选出下一个 Actor，或给出终止信号
//!
//! 只按已经确定的 step 路由，不做任何分支判断；分支由产出 State 的 Actor 决定。

use crate::actors::ActorKind;
use crate::core::{latest_state, Message, State, Step};

/// 编排结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Next(ActorKind),
    Terminate,
}

/// 路由表：step -> 下一个 Actor（None 表示历史中尚无 State）
///
/// 终止态在这里路由到 Planner，仅用于「终止态之后又来了新的用户文本」的情况；
/// 终止态本身是最后一条消息时由 [`Orchestrator::next_actor`] 直接终止。
pub fn dispatch(step: Option<Step>) -> ActorKind {
    match step {
        None | Some(Step::Succeeded) | Some(Step::NotATask) => ActorKind::Planner,
        Some(Step::CreateTask) => ActorKind::Coder,
        Some(Step::WriteCode) => ActorKind::Reviewer,
        Some(Step::ReviewCode) => ActorKind::Planner,
        Some(Step::FixComment) => ActorKind::Coder,
        Some(Step::RunCode) => ActorKind::Runner,
        Some(Step::RunCodeResult) => ActorKind::Planner,
        Some(Step::FixCodeError) => ActorKind::Coder,
        Some(Step::SearchSolution) => ActorKind::WebSearch,
        Some(Step::SearchSolutionResult) => ActorKind::Coder,
        Some(Step::ImproveCode) => ActorKind::Coder,
    }
}

/// 编排器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct Orchestrator;

impl Orchestrator {
    pub fn new() -> Self {
        Self
    }

    /// 最后一条消息携带终止态则终止；否则按最新 State 的 step 查表
    pub fn next_actor(&self, history: &[Message]) -> Route {
        if history
            .last()
            .and_then(Message::as_state)
            .is_some_and(State::is_terminal)
        {
            return Route::Terminate;
        }
        Route::Next(dispatch(latest_state(history).map(State::step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransitionGraph;

    fn state_msg(state: State) -> Message {
        Message::state("planner", state)
    }

    #[test]
    fn test_raw_user_text_goes_to_planner() {
        let history = vec![Message::user("print the sum of 2 and 3")];
        assert_eq!(
            Orchestrator::new().next_actor(&history),
            Route::Next(ActorKind::Planner)
        );
    }

    #[test]
    fn test_terminal_last_message_terminates() {
        let orchestrator = Orchestrator::new();
        let done = state_msg(State::Succeeded {
            task: "t".into(),
            code: "c".into(),
            run_result: "5".into(),
            answer: "5".into(),
        });
        assert_eq!(orchestrator.next_actor(&[done.clone()]), Route::Terminate);
        assert_eq!(
            orchestrator.next_actor(&[state_msg(State::NotATask { task: None })]),
            Route::Terminate
        );

        // 终止后又来了新问题：开始新任务
        let history = vec![done, Message::user("now print 3 + 4")];
        assert_eq!(
            orchestrator.next_actor(&history),
            Route::Next(ActorKind::Planner)
        );
    }

    #[test]
    fn test_trailing_text_does_not_hide_intermediate_state() {
        let history = vec![
            state_msg(State::RunCode {
                task: "t".into(),
                code: "c".into(),
            }),
            Message::user("hurry up"),
        ];
        assert_eq!(
            Orchestrator::new().next_actor(&history),
            Route::Next(ActorKind::Runner)
        );
    }

    #[test]
    fn test_every_reachable_step_routes_to_an_accepting_actor() {
        let graph = TransitionGraph::new();
        assert!(ActorKind::Planner.accepts(None));
        for step in graph.reachable_from_start() {
            let actor = dispatch(Some(step));
            assert!(actor.accepts(Some(step)), "{actor} does not accept {step}");
        }
        // 种子可直接给出任意 State，所以对全部 Step 也应成立
        for step in Step::ALL {
            assert!(dispatch(Some(step)).accepts(Some(step)));
        }
    }

    #[test]
    fn test_graph_successors_are_produced_by_routed_actor() {
        // 每条边的起点所路由到的 Actor，必须接受该起点
        let graph = TransitionGraph::new();
        for from in std::iter::once(None).chain(Step::ALL.into_iter().map(Some)) {
            for to in graph.successors(from) {
                let actor = dispatch(from);
                assert!(actor.accepts(from), "{actor} cannot produce {to}");
            }
        }
    }

    /// 事件标签式编排：消息按「刚发生的事件」打标签，按事件选下一位发言者。
    /// 与状态文档式路由表是同一张转移表的两种编码，这里校验二者一致。
    #[derive(Debug, Clone, Copy)]
    enum EventType {
        CreateTask,
        WriteCode,
        RunCode,
        ExecuteResult,
        FixCodeError,
        SearchSolution,
        SearchSolutionResult,
        ImproveCode,
    }

    fn event_route(event: EventType) -> ActorKind {
        match event {
            EventType::CreateTask => ActorKind::Coder,
            EventType::WriteCode => ActorKind::Reviewer,
            EventType::RunCode => ActorKind::Runner,
            EventType::ExecuteResult => ActorKind::Planner,
            EventType::FixCodeError => ActorKind::Coder,
            EventType::ImproveCode => ActorKind::Coder,
            EventType::SearchSolution => ActorKind::WebSearch,
            EventType::SearchSolutionResult => ActorKind::Coder,
        }
    }

    fn event_to_step(event: EventType) -> Step {
        match event {
            EventType::CreateTask => Step::CreateTask,
            EventType::WriteCode => Step::WriteCode,
            EventType::RunCode => Step::RunCode,
            EventType::ExecuteResult => Step::RunCodeResult,
            EventType::FixCodeError => Step::FixCodeError,
            EventType::SearchSolution => Step::SearchSolution,
            EventType::SearchSolutionResult => Step::SearchSolutionResult,
            EventType::ImproveCode => Step::ImproveCode,
        }
    }

    #[test]
    fn test_event_table_agrees_with_state_table() {
        let events = [
            EventType::CreateTask,
            EventType::WriteCode,
            EventType::RunCode,
            EventType::ExecuteResult,
            EventType::FixCodeError,
            EventType::SearchSolution,
            EventType::SearchSolutionResult,
            EventType::ImproveCode,
        ];
        for event in events {
            assert_eq!(
                event_route(event),
                dispatch(Some(event_to_step(event))),
                "disagreement on {event:?}"
            );
        }
    }
}
