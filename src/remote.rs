use thiserror::Error;

/// RPC code the server uses for flood control (`FLOOD_WAIT_X` and friends).
pub const FLOOD_CODE: i32 = 420;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("flood wait ({seconds}s requested by server)")]
    FloodWait { seconds: u32 },
    #[error("{friendly}")]
    Rpc {
        code: i32,
        name: String,
        friendly: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Classifies an RPC error reported by the server.
    pub fn from_rpc(code: i32, name: &str, value: Option<u32>) -> Self {
        if code == FLOOD_CODE {
            return RemoteError::FloodWait {
                seconds: value.unwrap_or(0),
            };
        }
        RemoteError::Rpc {
            code,
            name: name.to_string(),
            friendly: format_rpc_error(code, name),
        }
    }

    pub fn is_flood_wait(&self) -> bool {
        matches!(self, RemoteError::FloodWait { .. })
    }
}

fn format_rpc_error(code: i32, name: &str) -> String {
    let label = match code {
        303 => "Wrong data center",
        400 => "Bad request",
        401 => "Not authorized",
        403 => "Forbidden",
        406 => "Not acceptable",
        500 => "Internal server error",
        _ => "Unknown RPC error",
    };

    let mut formatted = String::from(label);
    if !name.is_empty() {
        formatted.push_str(": ");
        formatted.push_str(name);
    }
    formatted.push_str(&format!(" (code {code})"));
    formatted
}
