pub mod kpis;
pub mod query;
pub mod viewer;

pub use kpis::calculate_kpis;
pub use query::{filter_and_sort, query_clashes, ClashPage};
pub use viewer::{model_urns, ModelUrns, ViewerClash, ViewerElement};
