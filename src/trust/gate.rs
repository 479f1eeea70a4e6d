use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::hooks::{HookFile, HookKind};
use super::store::{TrustStatus, TrustStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustMode {
    Always,
    Never,
    #[default]
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    /// Record the file as trusted and run its commands.
    Trust,
    /// Skip the commands this time; nothing is recorded.
    Block,
    /// Abort the operation that needed the hooks.
    Cancel,
}

/// Sent to whoever presents the trust prompt. Dropping it unanswered
/// counts as `Cancel`.
#[derive(Debug)]
pub struct TrustRequest {
    pub config_path: PathBuf,
    pub commands: Vec<String>,
    responder: oneshot::Sender<TrustDecision>,
}

impl TrustRequest {
    pub fn respond(self, decision: TrustDecision) {
        let _ = self.responder.send(decision);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResolution {
    Run(Vec<String>),
    Skip,
    Cancelled,
}

type Waiters = Vec<oneshot::Sender<TrustDecision>>;

/// Decides whether repository-declared hook commands may run.
pub struct TrustGate {
    mode: TrustMode,
    store: tokio::sync::Mutex<TrustStore>,
    prompts: Option<mpsc::Sender<TrustRequest>>,
    pending: Mutex<HashMap<PathBuf, Waiters>>,
}

impl TrustGate {
    pub fn new(mode: TrustMode, store: TrustStore, prompts: Option<mpsc::Sender<TrustRequest>>) -> Self {
        Self {
            mode,
            store: tokio::sync::Mutex::new(store),
            prompts,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> TrustMode {
        self.mode
    }

    pub async fn status(&self, config_path: &Path) -> TrustStatus {
        self.store.lock().await.check(config_path)
    }

    /// Resolves the commands of `kind` declared in `config_path`.
    pub async fn resolve(&self, config_path: &Path, kind: HookKind) -> HookResolution {
        if self.mode == TrustMode::Never {
            return HookResolution::Skip;
        }

        let file = match HookFile::read(config_path).await {
            Ok(Some(file)) => file,
            Ok(None) => return HookResolution::Skip,
            Err(e) => {
                tracing::warn!("Failed to read hook file {:?}: {}", config_path, e);
                return HookResolution::Skip;
            }
        };
        let commands = file.commands(kind).to_vec();
        if commands.is_empty() {
            return HookResolution::Skip;
        }

        if self.mode == TrustMode::Always {
            return HookResolution::Run(commands);
        }

        let status = self
            .store
            .lock()
            .await
            .status_for(config_path, &file.fingerprint);
        if status == TrustStatus::Trusted {
            return HookResolution::Run(commands);
        }

        match self.ask(&file, &commands).await {
            TrustDecision::Trust => HookResolution::Run(commands),
            TrustDecision::Block => {
                tracing::debug!("{} in {:?} blocked", kind.as_str(), config_path);
                HookResolution::Skip
            }
            TrustDecision::Cancel => HookResolution::Cancelled,
        }
    }

    /// One prompt per file at a time; concurrent askers share its answer.
    async fn ask(&self, file: &HookFile, commands: &[String]) -> TrustDecision {
        let waiter = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.get_mut(&file.path) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    pending.insert(file.path.clone(), Vec::new());
                    None
                }
            }
        };
        if let Some(rx) = waiter {
            return rx.await.unwrap_or(TrustDecision::Cancel);
        }

        let mut guard = PendingPrompt {
            gate: self,
            path: &file.path,
            decision: TrustDecision::Cancel,
        };
        let decision = self.prompt(file, commands).await;
        if decision == TrustDecision::Trust {
            let mut store = self.store.lock().await;
            if let Err(e) = store.trust(&file.path, &file.fingerprint) {
                tracing::warn!("Failed to record trust for {:?}: {}", file.path, e);
            }
        }
        guard.decision = decision;
        decision
    }

    async fn prompt(&self, file: &HookFile, commands: &[String]) -> TrustDecision {
        let Some(prompts) = &self.prompts else {
            tracing::warn!("No trust prompt available for {:?}", file.path);
            return TrustDecision::Cancel;
        };
        let (responder, rx) = oneshot::channel();
        let request = TrustRequest {
            config_path: file.path.clone(),
            commands: commands.to_vec(),
            responder,
        };
        if prompts.send(request).await.is_err() {
            return TrustDecision::Cancel;
        }
        rx.await.unwrap_or(TrustDecision::Cancel)
    }
}

/// Clears the in-flight entry and wakes waiters, also when the asking
/// future is dropped mid-prompt.
struct PendingPrompt<'a> {
    gate: &'a TrustGate,
    path: &'a Path,
    decision: TrustDecision,
}

impl Drop for PendingPrompt<'_> {
    fn drop(&mut self) {
        let waiters = self
            .gate
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.path)
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(self.decision);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    const HOOKS: &str = "init_commands:\n  - make setup\nterminate_commands: echo bye\n";

    struct Fixture {
        _dir: TempDir,
        hook: PathBuf,
        store_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let hook = dir.path().join(".wt");
        std::fs::write(&hook, HOOKS).unwrap();
        let store_path = dir.path().join("state").join("trusted.json");
        Fixture {
            _dir: dir,
            hook,
            store_path,
        }
    }

    fn gate(fx: &Fixture, mode: TrustMode, prompts: Option<mpsc::Sender<TrustRequest>>) -> TrustGate {
        TrustGate::new(mode, TrustStore::load(fx.store_path.clone()), prompts)
    }

    /// Answers every prompt with `decision` and counts how many arrived.
    fn responder(decision: TrustDecision) -> (mpsc::Sender<TrustRequest>, Arc<Mutex<usize>>) {
        let (tx, mut rx) = mpsc::channel::<TrustRequest>(8);
        let count = Arc::new(Mutex::new(0));
        let seen = count.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                *seen.lock().unwrap() += 1;
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                request.respond(decision);
            }
        });
        (tx, count)
    }

    #[tokio::test]
    async fn never_mode_skips_even_trusted_files() {
        let fx = fixture();
        let (tx, count) = responder(TrustDecision::Trust);
        let gate = gate(&fx, TrustMode::Never, Some(tx));
        assert_eq!(gate.resolve(&fx.hook, HookKind::Init).await, HookResolution::Skip);
        assert_eq!(*count.lock().unwrap(), 0, "never mode must not prompt");
    }

    #[tokio::test]
    async fn always_mode_runs_without_prompting() {
        let fx = fixture();
        let gate = gate(&fx, TrustMode::Always, None);
        assert_eq!(
            gate.resolve(&fx.hook, HookKind::Terminate).await,
            HookResolution::Run(vec!["echo bye".to_string()])
        );
    }

    #[tokio::test]
    async fn missing_file_skips_silently() {
        let fx = fixture();
        let gate = gate(&fx, TrustMode::Ask, None);
        let absent = fx.hook.with_file_name("absent");
        assert_eq!(gate.resolve(&absent, HookKind::Init).await, HookResolution::Skip);
        assert_eq!(gate.status(&absent).await, TrustStatus::NoFile);
    }

    #[tokio::test]
    async fn trust_decision_is_recorded_and_not_asked_again() {
        let fx = fixture();
        let (tx, count) = responder(TrustDecision::Trust);
        let gate = gate(&fx, TrustMode::Ask, Some(tx));

        let first = gate.resolve(&fx.hook, HookKind::Init).await;
        assert_eq!(first, HookResolution::Run(vec!["make setup".to_string()]));
        assert_eq!(gate.status(&fx.hook).await, TrustStatus::Trusted);

        gate.resolve(&fx.hook, HookKind::Init).await;
        assert_eq!(*count.lock().unwrap(), 1, "a trusted file must not prompt again");
    }

    #[tokio::test]
    async fn modified_file_must_be_reapproved() {
        let fx = fixture();
        let (tx, count) = responder(TrustDecision::Trust);
        let gate = gate(&fx, TrustMode::Ask, Some(tx));
        gate.resolve(&fx.hook, HookKind::Init).await;

        std::fs::write(&fx.hook, "init_commands: rm -rf ~\n").unwrap();
        assert_eq!(gate.status(&fx.hook).await, TrustStatus::Untrusted);

        let again = gate.resolve(&fx.hook, HookKind::Init).await;
        assert_eq!(again, HookResolution::Run(vec!["rm -rf ~".to_string()]));
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn block_skips_and_records_nothing() {
        let fx = fixture();
        let (tx, _) = responder(TrustDecision::Block);
        let gate = gate(&fx, TrustMode::Ask, Some(tx));
        assert_eq!(gate.resolve(&fx.hook, HookKind::Init).await, HookResolution::Skip);
        assert_eq!(gate.status(&fx.hook).await, TrustStatus::Untrusted);
    }

    #[tokio::test]
    async fn cancel_propagates() {
        let fx = fixture();
        let (tx, _) = responder(TrustDecision::Cancel);
        let gate = gate(&fx, TrustMode::Ask, Some(tx));
        assert_eq!(
            gate.resolve(&fx.hook, HookKind::Init).await,
            HookResolution::Cancelled
        );
    }

    #[tokio::test]
    async fn closed_prompt_channel_is_cancel() {
        let fx = fixture();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let gate = gate(&fx, TrustMode::Ask, Some(tx));
        assert_eq!(
            gate.resolve(&fx.hook, HookKind::Init).await,
            HookResolution::Cancelled
        );
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_prompt() {
        let fx = fixture();
        let (tx, count) = responder(TrustDecision::Trust);
        let gate = gate(&fx, TrustMode::Ask, Some(tx));

        let (a, b) = tokio::join!(
            gate.resolve(&fx.hook, HookKind::Init),
            gate.resolve(&fx.hook, HookKind::Terminate)
        );
        assert_eq!(a, HookResolution::Run(vec!["make setup".to_string()]));
        assert_eq!(b, HookResolution::Run(vec!["echo bye".to_string()]));
        assert_eq!(*count.lock().unwrap(), 1, "concurrent: one prompt per file");
    }
}
