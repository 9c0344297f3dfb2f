use std::num::NonZeroUsize;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::COUNT_BUFFER_SIZE;
use crate::error::LoadError;

/// Count the data rows of a header-having file
///
/// One pass over the bytes; the total feeds the progress display only, so
/// quoted fields with embedded newlines may inflate it slightly.
pub async fn count_data_rows(path: &Path) -> Result<u64, LoadError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LoadError::source_io(path, e))?;

    let lines = count_lines(file)
        .await
        .map_err(|e| LoadError::source_io(path, e))?;

    // First line is the header
    Ok(lines.saturating_sub(1))
}

/// Count newline-delimited lines; a final line without a trailing newline still counts
pub async fn count_lines<R>(mut reader: R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; COUNT_BUFFER_SIZE];
    let mut lines = 0u64;
    let mut last_byte = None;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        lines += buffer[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last_byte = Some(buffer[n - 1]);
    }

    match last_byte {
        Some(b'\n') | None => Ok(lines),
        Some(_) => Ok(lines + 1),
    }
}

/// Number of batches needed for `total_rows` at the given capacity
pub fn batch_count(total_rows: u64, capacity: NonZeroUsize) -> u64 {
    total_rows.div_ceil(capacity.get() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_count_lines() {
        let test_cases: [(&[u8], u64); 6] = [
            (b"", 0),
            (b"header\n", 1),
            (b"header", 1),
            (b"header\nrow1\nrow2\n", 3),
            (b"header\nrow1\nrow2", 3),
            (b"\n\n", 2),
        ];

        for (input, expected) in test_cases {
            assert_eq!(
                count_lines(input).await.unwrap(),
                expected,
                "input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[tokio::test]
    async fn test_count_data_rows_excludes_header() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "year,origin").unwrap();
        writeln!(temp_file, "2024,JFK").unwrap();
        write!(temp_file, "2024,LAX").unwrap();
        temp_file.flush().unwrap();

        assert_eq!(count_data_rows(temp_file.path()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_data_rows_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        assert_eq!(count_data_rows(temp_file.path()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_spans_buffer_boundaries() {
        let mut content = String::from("h\n");
        // Enough rows that the scan needs several buffer fills
        let row = "x".repeat(99);
        for _ in 0..2_000 {
            content.push_str(&row);
            content.push('\n');
        }
        assert!(content.len() > COUNT_BUFFER_SIZE);

        assert_eq!(count_lines(content.as_bytes()).await.unwrap(), 2_001);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = count_data_rows(&dir.path().join("absent.csv")).await;
        assert!(matches!(result, Err(LoadError::MissingSource { .. })));
    }

    #[test]
    fn test_batch_count() {
        let cap = |n| NonZeroUsize::new(n).unwrap();
        assert_eq!(batch_count(250_000, cap(100_000)), 3);
        assert_eq!(batch_count(200_000, cap(100_000)), 2);
        assert_eq!(batch_count(1, cap(100_000)), 1);
        assert_eq!(batch_count(0, cap(100_000)), 0);
        assert_eq!(batch_count(10, cap(1)), 10);
    }
}
