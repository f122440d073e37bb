//! 基于子进程的持久会话运行时
//!
//! 每种语言一个长期存活的子进程（首次提交时启动，kill_on_drop）。
//! python / pwsh 运行内嵌驱动脚本：逐行读取代码直到结束标记，在共享作用域中执行，
//! 输出捕获结果，抛错时先写错误标记再写错误详情，最后写完成标记。
//! 其它 REPL（如 csharp 的 csi）在代码后追加两条语句：先向 stderr 写 stderr 结束标记，再向 stdout 写完成标记；
//! stdout 读到完成标记后，继续把 stderr 读到结束标记为止，这段 stderr 就是该块的错误输出。
//! 单块超时：杀掉并重置该语言会话，超时作为该块的错误返回，不终止对话。

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::config::{LanguageCommand, RuntimeSection};
use crate::runtime::{Execution, ExecutionRuntime, Language, RuntimeError};

const END_MARKER: &str = "__codecrew_end__";
const DONE_MARKER: &str = "__codecrew_done__";
const ERROR_MARKER: &str = "__codecrew_error__";
const STDERR_END_MARKER: &str = "__codecrew_stderr_end__";

const CSHARP_SENTINEL: &str = "System.Console.Error.WriteLine(\"__codecrew_stderr_end__\");\nSystem.Console.WriteLine(\"__codecrew_done__\");";

const PYTHON_DRIVER: &str = r##"
import contextlib, io, subprocess, sys, traceback

END = "__codecrew_end__"
DONE = "__codecrew_done__"
ERROR = "__codecrew_error__"

def _pip(args):
    result = subprocess.run([sys.executable, "-m", "pip"] + list(args), capture_output=True, text=True)
    sys.stdout.write(result.stdout)
    sys.stderr.write(result.stderr)

def _rewrite(source):
    lines = []
    for line in source.splitlines():
        stripped = line.lstrip()
        indent = line[: len(line) - len(stripped)]
        for prefix in ("%pip ", "!pip "):
            if stripped.startswith(prefix):
                line = indent + "_pip(%r)" % (stripped[len(prefix):].split(),)
                break
        lines.append(line)
    return "\n".join(lines)

def _read_block():
    lines = []
    while True:
        line = sys.stdin.readline()
        if not line:
            return None
        if line.rstrip("\r\n") == END:
            return "".join(lines)
        lines.append(line)

scope = {"__name__": "__main__", "_pip": _pip}
while True:
    source = _read_block()
    if source is None:
        break
    buffer = io.StringIO()
    error = None
    with contextlib.redirect_stdout(buffer), contextlib.redirect_stderr(buffer):
        try:
            exec(compile(_rewrite(source), "<code>", "exec"), scope)
        except SystemExit:
            pass
        except BaseException:
            error = traceback.format_exc()
    out = sys.__stdout__
    text = buffer.getvalue()
    out.write(text)
    if text and not text.endswith("\n"):
        out.write("\n")
    if error is not None:
        out.write(ERROR + "\n")
        out.write(error)
        if not error.endswith("\n"):
            out.write("\n")
    out.write(DONE + "\n")
    out.flush()
"##;

const PWSH_DRIVER: &str = r##"
while ($true) {
    $lines = New-Object System.Collections.Generic.List[string]
    $eof = $false
    while ($true) {
        $line = [Console]::In.ReadLine()
        if ($null -eq $line) { $eof = $true; break }
        if ($line -eq '__codecrew_end__') { break }
        $lines.Add($line)
    }
    if ($eof) { break }
    $source = $lines -join [Environment]::NewLine
    $failure = $null
    $output = ''
    try {
        $output = . ([scriptblock]::Create($source)) *>&1 | Out-String
    } catch {
        $failure = $_ | Out-String
    }
    if ($output) { [Console]::Out.WriteLine($output.TrimEnd()) }
    if ($failure) {
        [Console]::Out.WriteLine('__codecrew_error__')
        [Console]::Out.WriteLine($failure.TrimEnd())
    }
    [Console]::Out.WriteLine('__codecrew_done__')
    [Console]::Out.Flush()
}
"##;

/// 一个语言的活动会话
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    /// stderr 按行转发（后台读取任务）
    stderr: mpsc::UnboundedReceiver<String>,
}

impl Session {
    /// 取走目前已收到的 stderr，不等待
    fn drain_stderr(&mut self) -> String {
        let mut buf = String::new();
        while let Ok(line) = self.stderr.try_recv() {
            buf.push_str(&line);
            buf.push('\n');
        }
        buf
    }

    /// 读取 stderr 直到结束标记，返回标记之前的内容
    async fn stderr_until_marker(&mut self, language: Language) -> Result<String, RuntimeError> {
        let mut buf = String::new();
        loop {
            let line = self
                .stderr
                .recv()
                .await
                .ok_or(RuntimeError::SessionClosed { language })?;
            if line.contains(STDERR_END_MARKER) {
                return Ok(buf);
            }
            buf.push_str(&line);
            buf.push('\n');
        }
    }
}

/// 子进程运行时：每种语言一个互斥保护的惰性会话
pub struct ProcessRuntime {
    commands: HashMap<Language, LanguageCommand>,
    sessions: HashMap<Language, Mutex<Option<Session>>>,
    timeout: Duration,
}

impl ProcessRuntime {
    pub fn new(commands: HashMap<Language, LanguageCommand>, timeout_secs: u64) -> Self {
        let sessions = Language::ALL
            .iter()
            .map(|lang| (*lang, Mutex::new(None)))
            .collect();
        Self {
            commands,
            sessions,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn from_config(section: &RuntimeSection) -> Self {
        let commands = HashMap::from([
            (Language::Python, section.python.clone()),
            (Language::Pwsh, section.pwsh.clone()),
            (Language::CSharp, section.csharp.clone()),
        ]);
        Self::new(commands, section.timeout_secs)
    }

    fn spawn(&self, language: Language) -> Result<Session, RuntimeError> {
        let spec = self
            .commands
            .get(&language)
            .ok_or(RuntimeError::Unavailable(language))?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        match language {
            Language::Python => {
                cmd.args(["-u", "-c", PYTHON_DRIVER]);
            }
            Language::Pwsh => {
                cmd.args(["-NoLogo", "-NoProfile", "-NonInteractive", "-Command", PWSH_DRIVER]);
            }
            Language::CSharp => {}
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RuntimeError::Spawn {
            language,
            message: format!("{}: {}", spec.program, e),
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RuntimeError::Io("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Io("child stdout not captured".to_string()))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Io("child stderr not captured".to_string()))?;
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stderr_tx.send(line).is_err() {
                    break;
                }
            }
        });

        tracing::info!(language = %language, program = %spec.program, "runtime session started");
        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr: stderr_rx,
        })
    }

    async fn exchange(
        session: &mut Session,
        language: Language,
        code: &str,
    ) -> Result<Execution, RuntimeError> {
        let trailer = match language {
            Language::Python | Language::Pwsh => END_MARKER,
            Language::CSharp => CSHARP_SENTINEL,
        };
        let payload = format!("{}\n{}\n", code.trim_end(), trailer);
        session
            .stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| RuntimeError::Io(e.to_string()))?;
        session
            .stdin
            .flush()
            .await
            .map_err(|e| RuntimeError::Io(e.to_string()))?;

        let mut output = String::new();
        let mut error: Option<String> = None;
        loop {
            let line = session
                .stdout
                .next_line()
                .await
                .map_err(|e| RuntimeError::Io(e.to_string()))?
                .ok_or(RuntimeError::SessionClosed { language })?;
            if line.contains(DONE_MARKER) {
                break;
            }
            if line.trim_end() == ERROR_MARKER {
                error = Some(String::new());
                continue;
            }
            let target = match error.as_mut() {
                Some(err) => err,
                None => &mut output,
            };
            target.push_str(&line);
            target.push('\n');
        }

        let stderr = match language {
            // 驱动脚本已把 stderr 并入 stdout，这里只收零散输出
            Language::Python | Language::Pwsh => session.drain_stderr(),
            Language::CSharp => session.stderr_until_marker(language).await?,
        };
        if !stderr.trim().is_empty() {
            error.get_or_insert_with(String::new).push_str(&stderr);
        }

        Ok(Execution {
            output: output.trim_end().to_string(),
            error: error.map(|e| e.trim_end().to_string()),
        })
    }
}

#[async_trait]
impl ExecutionRuntime for ProcessRuntime {
    async fn submit(&self, code: &str, language: Language) -> Result<Execution, RuntimeError> {
        let slot = self
            .sessions
            .get(&language)
            .ok_or(RuntimeError::Unavailable(language))?;
        let mut guard = slot.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn(language)?);
        }

        let start = Instant::now();
        let result = match guard.as_mut() {
            Some(session) => timeout(self.timeout, Self::exchange(session, language, code)).await,
            None => return Err(RuntimeError::Unavailable(language)),
        };

        let outcome = match &result {
            Ok(Ok(exec)) if exec.is_ok() => "ok",
            Ok(Ok(_)) => "error",
            Ok(Err(_)) => "failed",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "code_audit",
            "language": language.tag(),
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "code_chars": code.chars().count(),
        });
        tracing::info!(audit = %audit.to_string(), "runtime");

        match result {
            Ok(Ok(exec)) => Ok(exec),
            Ok(Err(e)) => {
                // 管道已不可用，丢弃会话，下次提交重新启动
                *guard = None;
                Err(e)
            }
            Err(_) => {
                if let Some(mut session) = guard.take() {
                    let _ = session.child.start_kill();
                }
                tracing::warn!(language = %language, "code block timed out, session reset");
                Ok(Execution::failed(
                    "",
                    format!("Execution timed out after {}s", self.timeout.as_secs()),
                ))
            }
        }
    }

    async fn shutdown(&self) {
        for (language, slot) in &self.sessions {
            if let Some(mut session) = slot.lock().await.take() {
                if let Err(e) = session.child.kill().await {
                    tracing::warn!(language = %language, "failed to stop session: {}", e);
                } else {
                    tracing::info!(language = %language, "runtime session stopped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_runtime(timeout_secs: u64) -> ProcessRuntime {
        let commands = HashMap::from([(
            Language::Python,
            LanguageCommand {
                program: "python3".into(),
                args: vec![],
            },
        )]);
        ProcessRuntime::new(commands, timeout_secs)
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let commands = HashMap::from([(
            Language::CSharp,
            LanguageCommand {
                program: "codecrew-no-such-interpreter".into(),
                args: vec![],
            },
        )]);
        let runtime = ProcessRuntime::new(commands, 5);
        let err = runtime
            .submit("System.Console.WriteLine(1);", Language::CSharp)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { language: Language::CSharp, .. }));
    }

    /// 模拟 csi：普通行原样写到 stderr，并按追加的两条语句写出标记
    #[cfg(unix)]
    const FAKE_REPL: &str = r#"while IFS= read -r line; do
  case "$line" in
    *Console.Error.WriteLine*) echo __codecrew_stderr_end__ >&2 ;;
    *Console.WriteLine*) echo __codecrew_done__ ;;
    *) echo "err:$line" >&2 ;;
  esac
done"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_stays_with_its_block() {
        let commands = HashMap::from([(
            Language::CSharp,
            LanguageCommand {
                program: "sh".into(),
                args: vec!["-c".into(), FAKE_REPL.into()],
            },
        )]);
        let runtime = ProcessRuntime::new(commands, 10);
        for i in 0..50 {
            let exec = runtime
                .submit(&format!("block{i}"), Language::CSharp)
                .await
                .unwrap();
            assert_eq!(exec.output, "");
            assert_eq!(exec.error, Some(format!("err:block{i}")), "block {i}");
        }
        runtime.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_quiet_block_has_no_error() {
        let script = r#"while IFS= read -r line; do
  case "$line" in
    *Console.Error.WriteLine*) echo __codecrew_stderr_end__ >&2 ;;
    *Console.WriteLine*) echo __codecrew_done__ ;;
    *) echo "out:$line" ;;
  esac
done"#;
        let commands = HashMap::from([(
            Language::CSharp,
            LanguageCommand {
                program: "sh".into(),
                args: vec!["-c".into(), script.into()],
            },
        )]);
        let runtime = ProcessRuntime::new(commands, 10);
        let exec = runtime.submit("hello", Language::CSharp).await.unwrap();
        assert_eq!(exec, Execution::ok("out:hello"));
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_unconfigured_language_is_unavailable() {
        let runtime = python_runtime(5);
        let err = runtime.submit("Write-Output 1", Language::Pwsh).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(Language::Pwsh)));
    }

    #[tokio::test]
    #[ignore = "requires python3 on PATH"]
    async fn test_python_session_keeps_bindings() {
        let runtime = python_runtime(30);
        let first = runtime.submit("x = 2 + 3", Language::Python).await.unwrap();
        assert!(first.is_ok());
        let second = runtime.submit("print(x)", Language::Python).await.unwrap();
        assert_eq!(second.output, "5");

        let failed = runtime.submit("1 / 0", Language::Python).await.unwrap();
        assert!(failed.error.unwrap().contains("ZeroDivisionError"));
        runtime.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "requires python3 on PATH"]
    async fn test_python_timeout_resets_session() {
        let runtime = python_runtime(1);
        let slow = runtime
            .submit("import time\ntime.sleep(5)", Language::Python)
            .await
            .unwrap();
        assert!(slow.error.unwrap().contains("timed out"));
        let after = runtime.submit("print('alive')", Language::Python).await.unwrap();
        assert_eq!(after.output, "alive");
        runtime.shutdown().await;
    }
}
