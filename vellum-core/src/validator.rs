//! Building, signing and checking documents.
//!
//! Stores never validate what they are given; a [`FormatValidator`] is the
//! gatekeeper used by whoever produces or ingests documents.

use serde::Serialize;
use std::{fmt::Debug, sync::Arc};

use crate::{
    crypto::{CryptoDriver, decode_author_address, decode_author_keypair},
    document::{AuthorKeypair, DocToSet, Document, WorkspaceAddress, microsecond_now},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// How far into the future a timestamp may be before a document is rejected.
pub const FUTURE_CUTOFF_MICROSECONDS: i64 = 10 * 60 * 1_000_000;

/// Placeholder signature carried by a document before it is signed.
pub const UNSIGNED: &str = "?";

/// Document-format rules: hashing, signing and validity checks.
pub trait FormatValidator: Send + Sync + Debug {
    /// The crypto capability this validator signs and verifies with.
    fn crypto(&self) -> &dyn CryptoDriver;

    /// Digest of `content` in the format stored in `content_hash`.
    fn hash_content(&self, content: &str) -> String;

    /// Returns `doc` with its signature filled in by `keypair`.
    fn sign_document(&self, keypair: &AuthorKeypair, doc: Document) -> DocumentStoreResult<Document>;

    /// Checks every rule a stored document must satisfy, as of `now`.
    fn check_document_is_valid(&self, doc: &Document, now: i64) -> DocumentStoreResult<()>;

    /// Builds and signs a new document for `keypair` from caller-supplied fields.
    fn generate_document(
        &self,
        keypair: &AuthorKeypair,
        workspace: &WorkspaceAddress,
        doc_to_set: &DocToSet,
    ) -> DocumentStoreResult<Document> {
        let doc = Document {
            path: doc_to_set.path.clone(),
            author: keypair.address.clone(),
            content: doc_to_set.content.clone(),
            content_hash: self.hash_content(&doc_to_set.content),
            timestamp: doc_to_set.timestamp.unwrap_or_else(microsecond_now),
            delete_after: doc_to_set.delete_after,
            workspace: workspace.clone(),
            signature: UNSIGNED.to_string(),
            local_index: None,
        };

        self.sign_document(keypair, doc)
    }
}

// Everything an author signs: all authorial fields except the signature.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningPayload<'a> {
    author: &'a str,
    content_hash: &'a str,
    delete_after: Option<i64>,
    path: &'a str,
    timestamp: i64,
    workspace: &'a str,
}

impl<'a> From<&'a Document> for SigningPayload<'a> {
    fn from(doc: &'a Document) -> Self {
        Self {
            author: &doc.author,
            content_hash: &doc.content_hash,
            delete_after: doc.delete_after,
            path: &doc.path,
            timestamp: doc.timestamp,
            workspace: &doc.workspace,
        }
    }
}

/// The default document format: hex SHA-256 content hashes and hex ed25519
/// signatures over a canonical JSON payload.
#[derive(Debug, Clone)]
pub struct ValidatorEs4 {
    crypto: Arc<dyn CryptoDriver>,
}

impl ValidatorEs4 {
    pub fn new(crypto: Arc<dyn CryptoDriver>) -> Self {
        Self { crypto }
    }

    fn signing_message(doc: &Document) -> DocumentStoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(&SigningPayload::from(doc))?)
    }

    fn check_path(path: &str) -> DocumentStoreResult<()> {
        let valid = path.starts_with('/')
            && !path.ends_with('/')
            && !path.contains("//")
            && path.chars().all(|c| c.is_ascii_graphic());
        if valid {
            Ok(())
        } else {
            Err(DocumentStoreError::validation(format!("invalid path: {path:?}")))
        }
    }

    fn check_workspace(workspace: &str) -> DocumentStoreResult<()> {
        let valid = workspace
            .strip_prefix('+')
            .and_then(|rest| rest.split_once('.'))
            .is_some_and(|(name, suffix)| !name.is_empty() && !suffix.is_empty());
        if valid {
            Ok(())
        } else {
            Err(DocumentStoreError::validation(format!(
                "invalid workspace: {workspace:?}"
            )))
        }
    }

    fn check_timestamps(doc: &Document, now: i64) -> DocumentStoreResult<()> {
        if doc.timestamp < 0 {
            return Err(DocumentStoreError::validation("timestamp is negative"));
        }
        if doc.timestamp > now + FUTURE_CUTOFF_MICROSECONDS {
            return Err(DocumentStoreError::validation("timestamp is too far in the future"));
        }
        if let Some(delete_after) = doc.delete_after {
            if delete_after <= doc.timestamp {
                return Err(DocumentStoreError::validation(
                    "deleteAfter must be later than timestamp",
                ));
            }
            if delete_after <= now {
                return Err(DocumentStoreError::validation("document has expired"));
            }
        }
        Ok(())
    }
}

impl FormatValidator for ValidatorEs4 {
    fn crypto(&self) -> &dyn CryptoDriver {
        self.crypto.as_ref()
    }

    fn hash_content(&self, content: &str) -> String {
        hex::encode(self.crypto.sha256(content.as_bytes()))
    }

    fn sign_document(&self, keypair: &AuthorKeypair, doc: Document) -> DocumentStoreResult<Document> {
        if doc.author != keypair.address {
            return Err(DocumentStoreError::validation(
                "document author does not match keypair",
            ));
        }

        let keypair_bytes = decode_author_keypair(self.crypto(), keypair)
            .map_err(|err| DocumentStoreError::validation(err.to_string()))?;
        let signature = self
            .crypto
            .sign(&keypair_bytes, &Self::signing_message(&doc)?);

        Ok(Document {
            signature: hex::encode(signature),
            ..doc
        })
    }

    fn check_document_is_valid(&self, doc: &Document, now: i64) -> DocumentStoreResult<()> {
        Self::check_path(&doc.path)?;
        Self::check_workspace(&doc.workspace)?;
        Self::check_timestamps(doc, now)?;

        if doc.content_hash != self.hash_content(&doc.content) {
            return Err(DocumentStoreError::validation("content hash does not match content"));
        }

        let (_, pubkey) = decode_author_address(&doc.author)
            .map_err(|err| DocumentStoreError::validation(err.to_string()))?;
        let signature = hex::decode(&doc.signature)
            .map_err(|_| DocumentStoreError::validation("signature is not hex"))?;

        if !self
            .crypto
            .verify(&pubkey, &signature, &Self::signing_message(doc)?)
        {
            return Err(DocumentStoreError::validation("signature is invalid"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519CryptoDriver, generate_author_keypair};

    fn validator() -> ValidatorEs4 {
        ValidatorEs4::new(Arc::new(Ed25519CryptoDriver))
    }

    #[test]
    fn generated_documents_are_valid() {
        let validator = validator();
        let keypair = generate_author_keypair(validator.crypto(), "suzy").unwrap();

        let doc = validator
            .generate_document(
                &keypair,
                &"+gardening.abcde".to_string(),
                &DocToSet::new("/posts/hello.txt", "hello"),
            )
            .unwrap();

        assert_eq!(doc.author, keypair.address);
        assert_ne!(doc.signature, UNSIGNED);
        assert_eq!(doc.content_hash, validator.hash_content("hello"));
        assert!(validator.check_document_is_valid(&doc, microsecond_now()).is_ok());
    }

    #[test]
    fn tampering_breaks_the_signature() {
        let validator = validator();
        let keypair = generate_author_keypair(validator.crypto(), "suzy").unwrap();
        let doc = validator
            .generate_document(
                &keypair,
                &"+gardening.abcde".to_string(),
                &DocToSet::new("/a", "hello"),
            )
            .unwrap();

        let moved = Document {
            path: "/b".to_string(),
            ..doc.clone()
        };
        assert!(validator.check_document_is_valid(&moved, microsecond_now()).is_err());

        let edited = Document {
            content: "goodbye".to_string(),
            ..doc
        };
        assert!(validator.check_document_is_valid(&edited, microsecond_now()).is_err());
    }

    #[test]
    fn signing_with_someone_elses_keypair_fails() {
        let validator = validator();
        let suzy = generate_author_keypair(validator.crypto(), "suzy").unwrap();
        let timm = generate_author_keypair(validator.crypto(), "timm").unwrap();

        let doc = validator
            .generate_document(&suzy, &"+gardening.abcde".to_string(), &DocToSet::new("/a", "x"))
            .unwrap();

        assert!(matches!(
            validator.sign_document(&timm, doc),
            Err(DocumentStoreError::Validation(_))
        ));
    }

    #[test]
    fn bad_paths_and_workspaces() {
        assert!(ValidatorEs4::check_path("/ok/path.txt").is_ok());
        assert!(ValidatorEs4::check_path("no-slash").is_err());
        assert!(ValidatorEs4::check_path("/double//slash").is_err());
        assert!(ValidatorEs4::check_path("/trailing/").is_err());
        assert!(ValidatorEs4::check_workspace("+gardening.abcde").is_ok());
        assert!(ValidatorEs4::check_workspace("gardening.abcde").is_err());
        assert!(ValidatorEs4::check_workspace("+gardening").is_err());
    }
}
