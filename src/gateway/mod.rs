//! Gateway module - probing, selection, model index and routing

pub mod health_check;
pub mod load_balancer;
pub mod model_index;
pub mod router;

pub use health_check::{HostCheckResult, HostManager, HostStatus};
pub use load_balancer::{compare_hosts, rank_online};
pub use model_index::{build_model_index, ModelIndex};
pub use router::{RoutedResponse, RoutedStream, Router, RouterConfig};
