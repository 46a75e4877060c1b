//! Manifest parse cache.

use super::{CacheKey, CachedValue, Registry, ResolvingSource, Snapshot, errors};
use crate::core::ModError;
use crate::modfile::{self, Line, ModFile};
use crate::source::{FileHandle, FileIdentity, FileSource};
use crate::span::{ColumnMapper, SourceRange, Uri};
use futures::FutureExt;
use std::sync::Arc;
use tracing::Instrument;

/// A successfully parsed manifest together with the mapper built from the
/// exact bytes that were parsed.
#[derive(Debug)]
pub struct ParsedManifest {
    pub uri: Uri,
    pub identity: FileIdentity,
    pub mapper: ColumnMapper,
    pub file: ModFile,
}

impl ParsedManifest {
    /// The source range of a statement.
    pub fn range(&self, line: &Line) -> Option<SourceRange> {
        self.mapper.range_from_offsets(line.start.byte, line.end.byte)
    }
}

impl Snapshot {
    /// Parses the manifest `fh`, memoized on its content identity.
    ///
    /// A grammar error fails with [`ModError::ManifestSyntax`], carrying the
    /// diagnostic recovered from the parser message when its position maps
    /// into the manifest.
    pub async fn parse_manifest(
        self: &Arc<Self>,
        fh: &Arc<dyn FileHandle>,
    ) -> Result<Arc<ParsedManifest>, ModError> {
        let key = CacheKey::Parse(fh.identity().clone());
        let file = Arc::clone(fh);
        let handle = self.handle_for(Registry::ParseMod, fh.uri(), key, move |snapshot| {
            async move { CachedValue::Parsed(parse_manifest_impl(snapshot, file).await) }.boxed()
        })?;

        match &*self.await_handle(&handle).await? {
            CachedValue::Parsed(result) => result.clone(),
            CachedValue::Derived(_) => Err(Self::unexpected_value(&handle)),
        }
    }
}

async fn parse_manifest_impl(
    snapshot: Arc<Snapshot>,
    fh: Arc<dyn FileHandle>,
) -> Result<Arc<ParsedManifest>, ModError> {
    let span = tracing::debug_span!("cache.parse_manifest", uri = %fh.uri());
    async move {
        let content = fh.read()?;
        match modfile::parse(&fh.uri().filename(), &content) {
            Ok(file) => {
                tracing::debug!(
                    target: "cache",
                    "parsed {}: {} requires, {} replaces",
                    fh.identity(),
                    file.require.len(),
                    file.replace.len()
                );
                Ok(Arc::new(ParsedManifest {
                    uri: fh.uri().clone(),
                    identity: fh.identity().clone(),
                    mapper: ColumnMapper::new(fh.uri().clone(), content),
                    file,
                }))
            }
            Err(error) => {
                let message = error.to_string();
                tracing::debug!(target: "cache", "parse failed: {}", message);
                let fallback: Arc<dyn FileSource> = snapshot;
                let source = ResolvingSource::for_file(&fh, fallback);
                let diagnostics = errors::extract_positioned(&message, &source).await.into_iter().collect();
                Err(ModError::ManifestSyntax {
                    uri: fh.uri().clone(),
                    message,
                    diagnostics,
                })
            }
        }
    }
    .instrument(span)
    .await
}
