use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("User store error: {0}")]
    UserStore(String),
}
