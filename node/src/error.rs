use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] relay_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] relay_protocol::ProtocolError),

    #[error("chain error: {0}")]
    Chain(#[from] relay_chain::ChainError),

    #[error("config error: {0}")]
    Config(String),

    #[error("peer network not started")]
    NotStarted,

    #[error("peer network already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
