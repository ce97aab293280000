pub mod aws;
pub mod classify;
pub mod ecs;
pub mod enumerate;
pub mod metadata;
pub mod notify;
pub mod query;
pub mod retry;
pub mod sweep;

#[cfg(test)]
mod testing;
