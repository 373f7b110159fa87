use mediasniff_common::ResponseMeta;

/// Everything an extractor may look at: the page URL (for relative
/// resolution), the raw markup, and any network response observations the
/// host has forwarded. Extractors never touch the network themselves.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub page_url: String,
    pub html: String,
    pub responses: Vec<ResponseMeta>,
}

impl ExtractionContext {
    pub fn for_page(page_url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            html: html.into(),
            responses: Vec::new(),
        }
    }

    pub fn with_responses(mut self, responses: Vec<ResponseMeta>) -> Self {
        self.responses = responses;
        self
    }
}
