pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Identifier streams diverged from sorted order at {context}.")]
	OutOfOrder { context: String },
	#[error("Export failed: {message}")]
	Export { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Export { message: err.to_string() }
	}
}
impl From<csv::Error> for Error {
	fn from(err: csv::Error) -> Self {
		Self::Export { message: err.to_string() }
	}
}

impl From<xref_storage::Error> for Error {
	fn from(err: xref_storage::Error) -> Self {
		match err {
			xref_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			xref_storage::Error::Json(inner) => Self::Storage { message: inner.to_string() },
			xref_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			xref_storage::Error::NotFound(message) => Self::NotFound { message },
			xref_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}
