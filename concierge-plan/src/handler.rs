//! The `{prepare, restore}` capability set shared by package and provider
//! handlers (spec §4.4, §9 "Capability-set polymorphism").

use async_trait::async_trait;

use concierge_core::error::Result;

#[async_trait]
pub trait Executable: Send + Sync {
    async fn prepare(&self) -> Result<()>;
    async fn restore(&self) -> Result<()>;
}

/// The two top-level actions a Plan can execute (spec §4.7, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Prepare,
    Restore,
}

/// Dispatches to `prepare`/`restore` on anything implementing `Executable`,
/// including trait objects of `Provider` via its `Executable` supertrait.
pub async fn do_action<E: Executable + ?Sized>(executable: &E, action: Action) -> Result<()> {
    match action {
        Action::Prepare => executable.prepare().await,
        Action::Restore => executable.restore().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        prepared: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Executable for Counter {
        async fn prepare(&self) -> Result<()> {
            self.prepared.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
        async fn restore(&self) -> Result<()> {
            self.prepared.store(false, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn do_action_dispatches_by_variant() {
        let c = Counter { prepared: std::sync::atomic::AtomicBool::new(false) };
        do_action(&c, Action::Prepare).await.unwrap();
        assert!(c.prepared.load(std::sync::atomic::Ordering::SeqCst));
        do_action(&c, Action::Restore).await.unwrap();
        assert!(!c.prepared.load(std::sync::atomic::Ordering::SeqCst));
    }
}
