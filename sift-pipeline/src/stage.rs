//! Stage contract consumed by the orchestrator.

use async_trait::async_trait;
use sift_core::{StageError, StageKind};
use std::sync::Arc;

/// One processing stage applied to a single table.
///
/// Implementations perform their own idempotent reads and writes against
/// the external store; they see only the table name and carry no run
/// bookkeeping. The orchestrator guarantees the previous stage completed
/// successfully before `execute` is invoked.
#[async_trait]
pub trait TableStage: Send + Sync {
    /// Which pipeline slot this stage fills.
    fn kind(&self) -> StageKind;

    /// Runs the stage against one table. A returned error is captured into
    /// the stage record and halts later stages for that table; it is never
    /// propagated past the pipeline task.
    async fn execute(&self, table: &str) -> Result<(), StageError>;
}

/// The full ordered stage set, one implementation per [`StageKind`].
#[derive(Clone)]
pub struct StageSet {
    extractor: Arc<dyn TableStage>,
    dictionary: Arc<dyn TableStage>,
    analyst: Arc<dyn TableStage>,
}

impl StageSet {
    pub fn new(
        extractor: Arc<dyn TableStage>,
        dictionary: Arc<dyn TableStage>,
        analyst: Arc<dyn TableStage>,
    ) -> Self {
        debug_assert_eq!(extractor.kind(), StageKind::Extractor);
        debug_assert_eq!(dictionary.kind(), StageKind::Dictionary);
        debug_assert_eq!(analyst.kind(), StageKind::Analyst);
        StageSet {
            extractor,
            dictionary,
            analyst,
        }
    }

    pub fn get(&self, kind: StageKind) -> &Arc<dyn TableStage> {
        match kind {
            StageKind::Extractor => &self.extractor,
            StageKind::Dictionary => &self.dictionary,
            StageKind::Analyst => &self.analyst,
        }
    }

    /// Stages in execution order.
    pub fn in_order(&self) -> [&Arc<dyn TableStage>; 3] {
        [&self.extractor, &self.dictionary, &self.analyst]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopStage {
        kind: StageKind,
    }

    #[async_trait]
    impl TableStage for NoopStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn execute(&self, _table: &str) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn noop(kind: StageKind) -> Arc<dyn TableStage> {
        Arc::new(NoopStage { kind })
    }

    #[test]
    fn test_in_order_matches_declared_stage_order() {
        let set = StageSet::new(
            noop(StageKind::Extractor),
            noop(StageKind::Dictionary),
            noop(StageKind::Analyst),
        );
        let kinds: Vec<StageKind> = set.in_order().iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StageKind::ALL.to_vec());
    }

    #[test]
    fn test_get_returns_matching_stage() {
        let set = StageSet::new(
            noop(StageKind::Extractor),
            noop(StageKind::Dictionary),
            noop(StageKind::Analyst),
        );
        for kind in StageKind::ALL {
            assert_eq!(set.get(kind).kind(), kind);
        }
    }
}
