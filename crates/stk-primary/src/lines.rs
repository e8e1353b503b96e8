use async_trait::async_trait;
use stk_bulk::{BulkError, LineSource};

/// Streams an HTTP response body as lines without buffering the whole export.
pub struct ResultLines {
    resp: reqwest::Response,
    buf: Vec<u8>,
    done: bool,
}

impl ResultLines {
    pub fn new(resp: reqwest::Response) -> Self {
        Self {
            resp,
            buf: Vec::new(),
            done: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[async_trait]
impl LineSource for ResultLines {
    async fn next_line(&mut self) -> Result<Option<String>, BulkError> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buf);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }
            match self.resp.chunk().await {
                Ok(Some(chunk)) => self.buf.extend_from_slice(&chunk),
                Ok(None) => self.done = true,
                Err(e) => return Err(BulkError::Transport(format!("export stream: {e}"))),
            }
        }
    }
}
