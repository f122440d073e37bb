//! 状态转移图
//!
//! 邻接表：输入阶段 -> 负责该阶段的 Actor 可以产出的阶段集合。
//! 分支（评审通过/不通过、执行成功/失败）由产出 State 的 Actor 决定，这里只约束合法范围；
//! 对话循环用它校验每一轮的输出，测试用它做可达性自检。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::Step;

/// 状态转移图；键为 None 表示「尚无 State」（初始态）
pub struct TransitionGraph {
    adjacency: HashMap<Option<Step>, Vec<Step>>,
}

impl Default for TransitionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionGraph {
    pub fn new() -> Self {
        let new_task = vec![Step::CreateTask, Step::NotATask];
        let mut adjacency = HashMap::new();

        adjacency.insert(None, new_task.clone());
        // 终止态之后若又来了用户文本，Planner 开始新任务
        adjacency.insert(Some(Step::Succeeded), new_task.clone());
        adjacency.insert(Some(Step::NotATask), new_task);

        adjacency.insert(Some(Step::CreateTask), vec![Step::WriteCode, Step::NotATask]);
        adjacency.insert(Some(Step::WriteCode), vec![Step::ReviewCode]);
        adjacency.insert(Some(Step::ReviewCode), vec![Step::RunCode, Step::FixComment]);
        adjacency.insert(Some(Step::FixComment), vec![Step::WriteCode]);
        adjacency.insert(Some(Step::RunCode), vec![Step::RunCodeResult]);
        adjacency.insert(
            Some(Step::RunCodeResult),
            vec![Step::Succeeded, Step::FixCodeError],
        );
        adjacency.insert(
            Some(Step::FixCodeError),
            vec![Step::WriteCode, Step::SearchSolution],
        );
        adjacency.insert(Some(Step::SearchSolution), vec![Step::SearchSolutionResult]);
        adjacency.insert(Some(Step::SearchSolutionResult), vec![Step::WriteCode]);
        adjacency.insert(Some(Step::ImproveCode), vec![Step::WriteCode]);

        Self { adjacency }
    }

    /// from 阶段之后可以出现的阶段
    pub fn successors(&self, from: Option<Step>) -> &[Step] {
        self.adjacency
            .get(&from)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn allows(&self, from: Option<Step>, to: Step) -> bool {
        self.successors(from).contains(&to)
    }

    /// 从初始态出发、在终止态处停下，能到达的全部阶段（BFS 顺序）
    pub fn reachable_from_start(&self) -> Vec<Step> {
        let mut seen: HashSet<Step> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<Step> = self.successors(None).iter().copied().collect();

        while let Some(step) = queue.pop_front() {
            if !seen.insert(step) {
                continue;
            }
            order.push(step);
            if step.is_terminal() {
                continue;
            }
            queue.extend(self.successors(Some(step)).iter().copied());
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_step_has_an_entry() {
        let graph = TransitionGraph::new();
        assert!(!graph.successors(None).is_empty());
        for step in Step::ALL {
            assert!(
                !graph.successors(Some(step)).is_empty(),
                "{step} has no successors"
            );
        }
    }

    #[test]
    fn test_both_terminal_steps_reachable() {
        let reachable = TransitionGraph::new().reachable_from_start();
        assert!(reachable.contains(&Step::Succeeded));
        assert!(reachable.contains(&Step::NotATask));
    }

    #[test]
    fn test_improve_code_only_reachable_by_seed() {
        // ImproveCode 没有任何 Actor 产出，只能由外部种子消息直接给出
        let reachable = TransitionGraph::new().reachable_from_start();
        assert!(!reachable.contains(&Step::ImproveCode));
        assert_eq!(reachable.len(), Step::ALL.len() - 1);
    }

    #[test]
    fn test_review_branches() {
        let graph = TransitionGraph::new();
        assert!(graph.allows(Some(Step::ReviewCode), Step::RunCode));
        assert!(graph.allows(Some(Step::ReviewCode), Step::FixComment));
        assert!(!graph.allows(Some(Step::ReviewCode), Step::Succeeded));
        assert!(!graph.allows(Some(Step::WriteCode), Step::RunCode));
    }

    #[test]
    fn test_succeeded_only_after_run_result() {
        let graph = TransitionGraph::new();
        let sources: Vec<Option<Step>> = std::iter::once(None)
            .chain(Step::ALL.into_iter().map(Some))
            .filter(|from| graph.allows(*from, Step::Succeeded))
            .collect();
        assert_eq!(sources, vec![Some(Step::RunCodeResult)]);
    }
}
