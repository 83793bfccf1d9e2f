pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RpcError {
    #[error("transport failure: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("node rejected the RPC credentials")]
    Unauthorized,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("response carries neither result nor error")]
    MissingResult,

    #[error("invalid hex in response: {0}")]
    Hex(String),

    #[error("could not decode node data: {0}")]
    Decode(String),
}

impl From<bitcoin::consensus::encode::Error> for RpcError {
    fn from(err: bitcoin::consensus::encode::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<hex::FromHexError> for RpcError {
    fn from(err: hex::FromHexError) -> Self {
        Self::Hex(err.to_string())
    }
}
