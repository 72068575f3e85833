mod view_count;

pub use view_count::{ObjectId, ViewCountRequest};
