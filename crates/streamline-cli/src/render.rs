use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use streamline_batch::BatchProcessor;

/// Writes each batch of tokens as one contiguous chunk
pub struct TokenPrinter<W> {
    out: Arc<Mutex<W>>,
}

impl TokenPrinter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TokenPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// Shared handle on the writer, for inspecting what was printed
    pub fn writer(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.out)
    }
}

#[async_trait]
impl<W: Write + Send + 'static> BatchProcessor<String> for TokenPrinter<W> {
    async fn process(&self, batch: Vec<String>) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(batch.concat().as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_written_in_order() {
        let printer = TokenPrinter::new(Vec::new());
        printer
            .process(vec!["Hel".to_string(), "lo".to_string()])
            .await
            .unwrap();
        printer.process(vec![", world".to_string()]).await.unwrap();

        let written = printer.writer().lock().unwrap().clone();
        assert_eq!(String::from_utf8(written).unwrap(), "Hello, world");
    }
}
