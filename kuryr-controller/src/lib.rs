//! Application layer: operational configuration, the typed Kubernetes
//! object views, and the C5/C6 resource handlers, wired together by the
//! `kuryr-k8s-controller` binary (`src/main.rs`).

pub mod config;
pub mod k8s_types;
pub mod lb_handler;
pub mod selflink;
pub mod spec_handler;
