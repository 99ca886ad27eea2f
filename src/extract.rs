use crate::app::ports::PageFetcher;
use crate::error::Result;
use crate::parser::parse_first_table;
use crate::types::TabularData;
use tracing::{debug, info, instrument};

const PREVIEW_ROWS: usize = 5;

/// Fetches a page and returns its first HTML table.
pub struct TableExtractor<'a> {
    fetcher: &'a dyn PageFetcher,
}

impl<'a> TableExtractor<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self { fetcher }
    }

    #[instrument(skip(self))]
    pub async fn extract(&self, url: &str) -> Result<TabularData> {
        let body = self.fetcher.fetch(url).await?;
        debug!("page body bytes={}", body.len());

        let table = parse_first_table(&body)?;
        info!(
            "Table extracted: rows={} columns={:?}",
            table.row_count(),
            table.column_names()
        );
        info!("preview:\n{}", table.head(PREVIEW_ROWS));
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FixtureFetcher(&'static str);

    #[async_trait]
    impl PageFetcher for FixtureFetcher {
        async fn fetch(&self, _url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_extract_returns_first_table() {
        let fetcher = FixtureFetcher(
            "<table><tr><th>a</th><th>b</th><th>c</th></tr><tr><td>x</td><td>y</td><td>1.5</td></tr></table>",
        );
        let table = TableExtractor::new(&fetcher)
            .extract("http://fixture.local/banks")
            .await
            .unwrap();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.row_count(), 1);
    }

    #[tokio::test]
    async fn test_extract_without_tables_fails() {
        let fetcher = FixtureFetcher("<p>moved</p>");
        let err = TableExtractor::new(&fetcher)
            .extract("http://fixture.local/empty")
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_preview_is_logged_at_info() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fetcher = FixtureFetcher(
            "<table><tr><th>Rank</th><th>Bank name</th><th>Cap</th></tr><tr><td>1</td><td>JPMorgan Chase</td><td>432.92</td></tr></table>",
        );
        TableExtractor::new(&fetcher)
            .extract("http://fixture.local/banks")
            .await
            .unwrap();

        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("preview:"));
        assert!(logged.contains("JPMorgan Chase"));
    }
}
