//! CommandDeliverer - 設定されたプログラムを起動して配送する
//!
//! payload は stdin へ、メタデータは `SWITCHBOARD_*` 環境変数へ。
//! 終了コード 0 で成功、それ以外とタイムアウトは失敗（dispatcher が retry を判断する）。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use switchboard_core::config::DeliveryConfig;
use switchboard_core::ports::{Deliverer, DeliveryError};
use switchboard_core::queue::Message;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandDeliverer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDeliverer {
    /// `None` when no command is configured.
    pub fn from_config(config: &DeliveryConfig) -> Option<Self> {
        let (program, args) = config.command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

#[async_trait]
impl Deliverer for CommandDeliverer {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("SWITCHBOARD_MESSAGE_ID", message.id.to_string())
            .env("SWITCHBOARD_SENDER", &message.sender)
            .env("SWITCHBOARD_RECIPIENT", &message.recipient)
            .env("SWITCHBOARD_TAG", &message.tag)
            .env("SWITCHBOARD_PRIORITY", message.priority.to_string())
            .env("SWITCHBOARD_ATTEMPT", (message.retry_count + 1).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeliveryError::new(format!("spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(message.payload.as_bytes()).await {
                Ok(()) => {}
                // program exited without reading; its exit status decides
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(DeliveryError::new(format!("write payload: {e}"))),
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DeliveryError::new(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| DeliveryError::new(format!("wait {}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        Err(DeliveryError::new(if stderr.is_empty() {
            format!("{} exited with {}", self.program, output.status)
        } else {
            format!("{} exited with {}: {stderr}", self.program, output.status)
        }))
    }
}

/// Stand-in for administrative commands that never deliver.
pub struct Unconfigured;

#[async_trait]
impl Deliverer for Unconfigured {
    async fn deliver(&self, _message: &Message) -> Result<(), DeliveryError> {
        Err(DeliveryError::new("delivery.command is not configured"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::Utc;
    use switchboard_core::domain::MessageId;

    fn message(payload: &str) -> Message {
        Message::new(
            MessageId::from_ulid(ulid::Ulid::new()),
            "A",
            "B",
            payload,
            "note",
            0,
            3,
            Utc::now(),
        )
    }

    fn deliverer(script: &str, timeout_ms: u64) -> CommandDeliverer {
        CommandDeliverer::from_config(&DeliveryConfig {
            command: vec!["sh".into(), "-c".into(), script.into()],
            timeout_ms,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn payload_and_metadata_reach_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let script = format!(
            "cat > {0} && echo \"$SWITCHBOARD_RECIPIENT $SWITCHBOARD_ATTEMPT\" >> {0}",
            out.display()
        );

        deliverer(&script, 5_000)
            .deliver(&message("hello"))
            .await
            .unwrap();

        let written = std::fs::read_to_string(out).unwrap();
        assert_eq!(written, "helloB 1\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure_with_stderr() {
        let err = deliverer("echo busy >&2; exit 3", 5_000)
            .deliver(&message("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("busy"));
    }

    #[tokio::test]
    async fn slow_program_times_out() {
        let err = deliverer("sleep 5", 100)
            .deliver(&message("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn empty_command_means_unconfigured() {
        assert!(CommandDeliverer::from_config(&DeliveryConfig::default()).is_none());
    }
}
