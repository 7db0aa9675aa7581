#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Cursor expired: {0}")]
	CursorExpired(String),
	#[error("Failed to decode stored event: {0}")]
	Decode(String),
}
