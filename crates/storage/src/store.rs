use crate::ViewCount;
use crate::error::Result;

/// Persisted view counters keyed by community and object id.
pub trait ViewCountStore: Clone + Send + Sync + 'static {
    fn add_community(&self, community: &str) -> impl Future<Output = Result<()>> + Send;

    fn community_exists(&self, community: &str) -> impl Future<Output = Result<bool>> + Send;

    fn find_view_count(
        &self,
        community: &str,
        object_id: &str,
    ) -> impl Future<Output = Result<Option<ViewCount>>> + Send;

    /// Creates the counter at zero, or returns the existing one untouched.
    fn init_view_count(
        &self,
        community: &str,
        object_id: &str,
    ) -> impl Future<Output = Result<ViewCount>> + Send;

    /// Adds one view in a single step, concurrent increments are never lost.
    fn increment_view_count(&self, id: i64) -> impl Future<Output = Result<ViewCount>> + Send;
}
