pub mod blob;
pub mod manifest;
pub mod tags;

use oci_spec::image::Digest;

use crate::digest;
use crate::error::RegistryError;
use crate::uploads::UploadError;
use crate::utils::validation::is_valid_name;

/// Name validation shared by every repository-scoped handler.
pub(crate) fn require_valid_name(name: &str) -> Result<(), RegistryError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(RegistryError::NameInvalid(name.to_string()))
    }
}

pub(crate) fn parse_digest(s: &str) -> Result<Digest, RegistryError> {
    digest::parse(s).map_err(|_| RegistryError::DigestInvalid(s.to_string()))
}

/// Maps session-level failures onto their OCI conditions. The offset
/// mismatch keeps enough context to render the 416 that points the client
/// back at the session tail.
pub(crate) fn upload_error(repo: &str, session_id: &str, err: UploadError) -> crate::error::AppError {
    match err {
        UploadError::Unknown(id) => RegistryError::BlobUploadUnknown(id).into(),
        UploadError::OffsetMismatch { current, .. } => RegistryError::RangeNotSatisfiable {
            repo: repo.to_string(),
            session_id: session_id.to_string(),
            current_size: current,
        }
        .into(),
        UploadError::DigestMismatch => {
            RegistryError::DigestInvalid("uploaded content does not match digest".to_string())
                .into()
        }
        UploadError::Io(e) => e.into(),
    }
}

/// The `Range` header value for an upload session: `0-(size-1)`, or `0-0`
/// for a session with nothing buffered yet.
pub(crate) fn session_range(size: u64) -> String {
    format!("0-{}", size.saturating_sub(1))
}
