use std::collections::HashMap;
use std::sync::Mutex;

use stitch_router_query_planner::request::RequestContext;

/// External plan cache hooks, keyed by request digest. Implementations must
/// tolerate concurrent reads and writes.
pub trait PlanCache: Send + Sync {
    fn read(&self, digest: &str, context: Option<&RequestContext>) -> Option<String>;
    fn write(&self, digest: &str, plan_json: &str, context: Option<&RequestContext>);
}

/// Process-local plan cache.
#[derive(Default)]
pub struct InMemoryPlanCache {
    inner: Mutex<HashMap<String, String>>,
}

impl InMemoryPlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("plan cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanCache for InMemoryPlanCache {
    fn read(&self, digest: &str, _context: Option<&RequestContext>) -> Option<String> {
        self.inner.lock().expect("plan cache lock").get(digest).cloned()
    }

    fn write(&self, digest: &str, plan_json: &str, _context: Option<&RequestContext>) {
        self.inner
            .lock()
            .expect("plan cache lock")
            .insert(digest.to_string(), plan_json.to_string());
    }
}
