//! Host-facing side of the virtual document store

use std::sync::Arc;

use tracing::{debug, info};

use crate::host::{Host, TextDocumentContentProvider};
use crate::session::{SessionController, SessionError};
use crate::virtual_doc::VirtualDocumentStore;
use crate::virtual_doc::protocol::{
    QUERY_VIRTUAL_FILE_INFO, QueryVirtualFileInfoParams, SOURCE_MAP_FRAGMENT, VirtualFileInfo,
    virtual_uri_for,
};

/// Serves virtual documents to the host's document resolution.
///
/// `<uri>` yields the compiled content and `<uri>#sourcemap` the source map.
pub struct VirtualDocumentProvider {
    store: Arc<VirtualDocumentStore>,
}

impl VirtualDocumentProvider {
    pub fn new(store: Arc<VirtualDocumentStore>) -> Self {
        Self { store }
    }
}

impl TextDocumentContentProvider for VirtualDocumentProvider {
    fn provide_text_document_content(&self, uri: &str) -> String {
        let (base, fragment) = match uri.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (uri, None),
        };

        let Some(file) = self.store.get(base) else {
            debug!("No virtual file for {}", uri);
            return String::new();
        };

        if fragment == Some(SOURCE_MAP_FRAGMENT) {
            file.source_map.clone()
        } else {
            file.content.clone()
        }
    }
}

/// Result of asking to show the virtual file of a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowVirtualFileOutcome {
    /// The host was asked to show this virtual uri
    Shown(String),
    /// The language server has no virtual representation for the source
    NoMapping,
}

/// Resolves the virtual document of `source_uri` through the language server
/// and asks the host to show it.
///
/// Content included in the reply is stored before the document is shown.
pub async fn show_virtual_file(
    controller: &SessionController,
    store: &VirtualDocumentStore,
    host: &dyn Host,
    source_uri: &str,
) -> Result<ShowVirtualFileOutcome, SessionError> {
    let params = QueryVirtualFileInfoParams {
        source_uri: source_uri.to_string(),
    };
    let info: Option<VirtualFileInfo> = controller.request(QUERY_VIRTUAL_FILE_INFO, &params).await?;

    let Some(info) = info else {
        info!("No virtual file for {}", source_uri);
        return Ok(ShowVirtualFileOutcome::NoMapping);
    };

    let uri = info.uri.unwrap_or_else(|| virtual_uri_for(source_uri));
    if let Some(content) = info.virtual_file_source {
        store.set_contents(&uri, content, info.pretty_source_map.unwrap_or_default());
    }

    host.show_document(&uri);
    Ok(ShowVirtualFileOutcome::Shown(uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with(uri: &str, content: &str, source_map: &str) -> VirtualDocumentProvider {
        let store = Arc::new(VirtualDocumentStore::new());
        store.set_contents(uri, content, source_map);
        VirtualDocumentProvider::new(store)
    }

    #[test]
    fn provides_content_for_known_uri() {
        let provider = provider_with("virtual://doc/1", "<div>{{x}}</div>", "1:1->1:1");

        assert_eq!(
            provider.provide_text_document_content("virtual://doc/1"),
            "<div>{{x}}</div>"
        );
    }

    #[test]
    fn provides_source_map_for_sourcemap_fragment() {
        let provider = provider_with("virtual://doc/1", "<div>{{x}}</div>", "1:1->1:1");

        assert_eq!(
            provider.provide_text_document_content("virtual://doc/1#sourcemap"),
            "1:1->1:1"
        );
    }

    #[test]
    fn unset_uri_yields_empty_placeholder() {
        let provider = VirtualDocumentProvider::new(Arc::new(VirtualDocumentStore::new()));

        assert_eq!(provider.provide_text_document_content("virtual://nothing"), "");
        assert_eq!(
            provider.provide_text_document_content("virtual://nothing#sourcemap"),
            ""
        );
    }

    #[test]
    fn unknown_fragment_falls_back_to_content() {
        let provider = provider_with("virtual://doc/1", "body", "map");

        assert_eq!(
            provider.provide_text_document_content("virtual://doc/1#L3"),
            "body"
        );
    }
}
