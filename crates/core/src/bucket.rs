//! Document-type to bucket policy.
//!
//! Each document category lives in its own bucket. Known categories come from a fixed
//! table; anything else is derived as `gampes-<type with '.' replaced by '-'>` and logged,
//! because an unmapped type means the table has fallen behind the catalog.

use crate::constants::BUCKET_NAMESPACE;
use std::fmt;

/// Static document-type token to bucket table.
pub const BUCKET_TABLE: &[(&str, &str)] = &[
    ("mni.documento.original", "gampes-mni-documento-original"),
    ("documento.externo", "gampes-documento-externo"),
    ("documento.assinatura", "gampes-documento-assinatura"),
    ("documento.renderizado", "gampes-documento-renderizado"),
    ("documento.sumarizado", "gampes-documento-sumarizado"),
    ("documento.transcricao", "gampes-documento-transcricao"),
    ("documento.visualizacao", "gampes-documento-visualizacao"),
    ("documento.pessoal", "gampes-documento-pessoal"),
    ("autos.movimento", "gampes-autos-movimento"),
    ("atividade.nao.procedimental", "gampes-atividade-nao-procedimental"),
    ("documento.gerador.denuncia", "gampes-documento-gerador-denuncia"),
    ("mni.comprovante", "gampes-mni-comprovante"),
    ("mni.documento.renderizado", "gampes-mni-documento-renderizado"),
];

/// Name of the bucket holding a document category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct BucketName {
    name: String,
    #[serde(skip)]
    derived: bool,
}

impl BucketName {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// True when the name came from the unmapped-type fallback rather than the table.
    pub fn is_derived(&self) -> bool {
        self.derived
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Maps document-type tokens to buckets.
///
/// `resolve` is total and deterministic: the same token always yields the same bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketPolicy;

impl BucketPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Exact-match lookup in [`BUCKET_TABLE`].
    pub fn lookup(&self, document_type: &str) -> Option<&'static str> {
        BUCKET_TABLE
            .iter()
            .find(|(token, _)| *token == document_type)
            .map(|(_, bucket)| *bucket)
    }

    /// Resolve the bucket for `document_type`, deriving one for unmapped types.
    pub fn resolve(&self, document_type: &str) -> BucketName {
        if let Some(bucket) = self.lookup(document_type) {
            return BucketName {
                name: bucket.to_owned(),
                derived: false,
            };
        }

        let name = derive_bucket_name(document_type);
        tracing::warn!(
            document_type,
            bucket = %name,
            "unmapped document type, using derived bucket"
        );
        BucketName {
            name,
            derived: true,
        }
    }

    /// Every bucket named in the static table.
    pub fn known_buckets(&self) -> impl Iterator<Item = &'static str> {
        BUCKET_TABLE.iter().map(|(_, bucket)| *bucket)
    }
}

fn derive_bucket_name(document_type: &str) -> String {
    format!("{BUCKET_NAMESPACE}-{}", document_type.replace('.', "-"))
}
