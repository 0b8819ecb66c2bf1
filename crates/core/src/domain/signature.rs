use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::errors::DomainError;

pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
pub const MAX_SIGNATURE_BYTES: usize = 512 * 1024;

/// The current e-signature of an actor. Saving again replaces it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub actor_id: ActorId,
    pub content_type: String,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

impl Signature {
    pub fn png(actor_id: ActorId, image: Vec<u8>, updated_at: DateTime<Utc>) -> Result<Self, DomainError> {
        if image.is_empty() {
            return Err(DomainError::Validation("signature image is empty".to_string()));
        }
        if image.len() > MAX_SIGNATURE_BYTES {
            return Err(DomainError::Validation(format!(
                "signature image exceeds {MAX_SIGNATURE_BYTES} bytes"
            )));
        }
        if !image.starts_with(&PNG_MAGIC) {
            return Err(DomainError::Validation("signature image must be a PNG".to_string()));
        }
        Ok(Self { actor_id, content_type: "image/png".to_string(), image, updated_at })
    }
}
