//! Permission prompts.
//!
//! A [`PermissionPrompt`] answers asynchronously; the controller never
//! blocks on it. [`ChannelPrompt`] hands the question to whatever front
//! end owns the terminal, [`PresetPrompt`] answers on its own.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use workbg_core::permission::{Permission, PermissionStatus};

/// Something that can ask the user for permissions.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Ask for `permissions`. Returns one status per permission, in order.
    /// An empty vector means the prompt was dismissed.
    async fn request(&self, permissions: &[Permission]) -> Vec<PermissionStatus>;
}

/// Prompt that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct PresetPrompt {
    answer: PermissionStatus,
}

impl PresetPrompt {
    pub fn new(answer: PermissionStatus) -> Self {
        Self { answer }
    }
}

#[async_trait]
impl PermissionPrompt for PresetPrompt {
    async fn request(&self, permissions: &[Permission]) -> Vec<PermissionStatus> {
        tracing::debug!(?permissions, answer = ?self.answer, "Answering permission prompt");
        vec![self.answer; permissions.len()]
    }
}

/// A question waiting for the front end.
#[derive(Debug)]
pub struct PromptRequest {
    pub permissions: Vec<Permission>,
    pub reply: oneshot::Sender<Vec<PermissionStatus>>,
}

impl PromptRequest {
    /// Answer every permission in the request with `status`.
    pub fn answer(self, status: PermissionStatus) {
        let _ = self.reply.send(vec![status; self.permissions.len()]);
    }
}

/// Prompt that forwards questions over a channel.
///
/// If the front end drops the request without replying, every permission
/// counts as denied.
#[derive(Debug, Clone)]
pub struct ChannelPrompt {
    requests: mpsc::Sender<PromptRequest>,
}

/// Questions queued before the front end picks them up.
const PROMPT_CHANNEL_CAPACITY: usize = 4;

impl ChannelPrompt {
    /// Create the prompt and the receiver the front end reads from.
    pub fn new() -> (Self, mpsc::Receiver<PromptRequest>) {
        let (requests, rx) = mpsc::channel(PROMPT_CHANNEL_CAPACITY);
        (Self { requests }, rx)
    }
}

#[async_trait]
impl PermissionPrompt for ChannelPrompt {
    async fn request(&self, permissions: &[Permission]) -> Vec<PermissionStatus> {
        let denied = vec![PermissionStatus::Denied; permissions.len()];
        let (reply, rx) = oneshot::channel();
        let request = PromptRequest {
            permissions: permissions.to_vec(),
            reply,
        };

        if self.requests.send(request).await.is_err() {
            tracing::warn!("No front end is listening for permission prompts");
            return denied;
        }

        rx.await.unwrap_or(denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preset_prompt_answers_every_permission() {
        let prompt = PresetPrompt::new(PermissionStatus::Granted);
        let grants = prompt.request(&[Permission::WriteStorage]).await;
        assert_eq!(grants, vec![PermissionStatus::Granted]);
    }

    #[tokio::test]
    async fn channel_prompt_relays_front_end_answer() {
        let (prompt, mut rx) = ChannelPrompt::new();

        let front_end = tokio::spawn(async move {
            let request = rx.recv().await.expect("prompt should be forwarded");
            assert_eq!(request.permissions, vec![Permission::WriteStorage]);
            request.answer(PermissionStatus::Granted);
        });

        let grants = prompt.request(&[Permission::WriteStorage]).await;
        front_end.await.unwrap();
        assert_eq!(grants, vec![PermissionStatus::Granted]);
    }

    #[tokio::test]
    async fn dropped_request_counts_as_denied() {
        let (prompt, mut rx) = ChannelPrompt::new();

        let front_end = tokio::spawn(async move {
            let request = rx.recv().await.expect("prompt should be forwarded");
            drop(request);
        });

        let grants = prompt.request(&[Permission::WriteStorage]).await;
        front_end.await.unwrap();
        assert_eq!(grants, vec![PermissionStatus::Denied]);
    }

    #[tokio::test]
    async fn missing_front_end_counts_as_denied() {
        let (prompt, rx) = ChannelPrompt::new();
        drop(rx);

        let grants = prompt.request(&[Permission::WriteStorage]).await;
        assert_eq!(grants, vec![PermissionStatus::Denied]);
    }
}
