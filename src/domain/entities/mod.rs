pub mod entity;
pub mod plan;
pub mod stripe_event;
pub mod subscription;
