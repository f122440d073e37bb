//! Codecrew 命令行入口
//!
//! 读取任务（参数或 stdin），组装 Crew 并运行对话，逐条打印消息。
//! 退出码：0 成功，2 非任务，3 轮数耗尽，1 出错。

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use futures_util::StreamExt;

use codecrew::config::load_config_or_default;
use codecrew::core::{
    decode_state, Conversation, CrewBuilder, Message, SessionSupervisor, State, USER_SENDER,
};
use codecrew::{observability, Outcome};

#[derive(Parser)]
#[command(name = "codecrew")]
#[command(about = "Turn a task into code, review it, run it and report the answer")]
struct Cli {
    /// 任务文本；省略时从 stdin 读取
    task: Option<String>,

    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 对话轮数上限（覆盖配置）
    #[arg(long)]
    max_rounds: Option<usize>,

    /// 输入已是编码好的 create_task State
    #[arg(long)]
    encoded: bool,
}

fn read_input(cli: &Cli) -> anyhow::Result<String> {
    let text = match &cli.task {
        Some(task) => task.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read task from stdin")?;
            buf
        }
    };
    if text.trim().is_empty() {
        bail!("No task given");
    }
    Ok(text)
}

fn seed_message(text: &str, encoded: bool) -> anyhow::Result<Message> {
    if !encoded {
        return Ok(Message::user(text.trim()));
    }
    match decode_state(text) {
        Some(state @ State::CreateTask { .. }) => Ok(Message::state(USER_SENDER, state)),
        Some(other) => bail!("Encoded input must be a create_task state, got {}", other.step()),
        None => bail!("Input is not an encoded state"),
    }
}

fn print_message(message: &Message) {
    println!("--- {} ---", message.from);
    match message.as_state() {
        Some(state) => {
            println!("[{}]", state.step());
            if let Some(answer) = state.answer() {
                println!("{}", answer);
            } else {
                println!("{}", message.to_text());
            }
        }
        None => println!("{}", message.to_text()),
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let config = load_config_or_default(cli.config.clone());
    let max_rounds = cli.max_rounds.unwrap_or(config.app.max_rounds);
    let seed = seed_message(&read_input(&cli)?, cli.encoded)?;

    let crew = CrewBuilder::new(config)
        .build()
        .context("Failed to build crew")?;

    let supervisor = SessionSupervisor::new();
    supervisor.cancel_on_ctrl_c();

    print_message(&seed);
    let mut last: Option<Message> = None;
    let mut rounds = 0usize;
    let mut stream = Conversation::new(crew, max_rounds)
        .with_cancel_token(supervisor.child_token())
        .run(vec![seed]);
    while let Some(item) = stream.next().await {
        let message = item.context("Conversation aborted")?;
        print_message(&message);
        rounds += 1;
        last = Some(message);
    }

    Ok(Outcome::from_last(last.as_ref(), rounds))
}

#[tokio::main]
async fn main() -> ExitCode {
    observability::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(outcome) => {
            match &outcome {
                Outcome::Succeeded { .. } => tracing::info!("task succeeded"),
                Outcome::NotATask => tracing::info!("not a task"),
                Outcome::Exhausted { rounds } => {
                    tracing::warn!("round budget exhausted after {} rounds", rounds)
                }
            }
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
