mod view_count;

pub use view_count::{record_view, view_count_router, viewer_id};
