use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Moves backwards in a file to beginning of a previous line.
pub async fn seek_line_backwards(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<(), io::Error> {
    // The new line right before the cursor belongs to the current line, so it's skipped.
    // For example: need_to_read_this\nwe_are_here_now\n
    let mut need_to_skip = 1usize;
    loop {
        let leftover = file.stream_position().await?;
        if leftover == 0 {
            return Ok(());
        }
        let next_chunk = u64::min(leftover, buffer.len() as u64) as usize;
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;

        file.read_exact(&mut buffer[..next_chunk]).await?;
        let iter = buffer[..next_chunk].iter().rev().enumerate();
        let iter = iter.skip(need_to_skip);
        for (index, value) in iter {
            if *value == b'\n' {
                file.seek(std::io::SeekFrom::Current(-(index as i64)))
                    .await?;
                return Ok(());
            }
        }

        need_to_skip = need_to_skip.saturating_sub(1);
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;
    }
}

/// Reads the last non-empty line of an append-only file without reading the whole file.
pub async fn read_last_line(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
) -> Result<Option<String>, io::Error> {
    file.seek(std::io::SeekFrom::End(0)).await?;
    seek_line_backwards(file, &mut vec![0; 1024]).await?;
    let mut last_line = String::new();
    file.read_to_string(&mut last_line).await?;
    let trimmed = last_line.trim_end();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;

    use tempfile::tempfile;
    use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

    use super::{read_last_line, seek_line_backwards};

    const ACTIVITY_LINES: &str = "{\"app\":\"Editor\"}\n\
                                  {\"app\":\"Terminal\"}\n\
                                  {\"app\":\"Browser\"}\n";

    #[tokio::test]
    async fn test_seek_line_backwards_to_start() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(ACTIVITY_LINES.as_bytes())?;
        let mut file = tokio::fs::File::from_std(file);

        for _ in 0..4 {
            seek_line_backwards(&mut file, vec![0; 1024].as_mut_slice()).await?;
        }

        assert_eq!(file.stream_position().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_seek_line_backwards_small_buffer() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(ACTIVITY_LINES.as_bytes())?;
        let positions = ACTIVITY_LINES
            .bytes()
            .enumerate()
            .filter(|v| v.1 == b'\n')
            .map(|v| v.0 as u64 + 1)
            .collect::<Vec<_>>();

        let mut file = BufReader::new(tokio::fs::File::from_std(file));
        file.seek(std::io::SeekFrom::Start(0)).await?;
        file.read_line(&mut String::new()).await?;
        file.read_line(&mut String::new()).await?;

        seek_line_backwards(&mut file, vec![0; 3].as_mut_slice()).await?;
        assert_eq!(file.stream_position().await?, positions[0]);

        seek_line_backwards(&mut file, vec![0; 3].as_mut_slice()).await?;
        assert_eq!(file.stream_position().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_read_last_line() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(ACTIVITY_LINES.as_bytes())?;
        let mut file = tokio::fs::File::from_std(file);

        let last = read_last_line(&mut file).await?;

        assert_eq!(last.as_deref(), Some("{\"app\":\"Browser\"}"));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_last_line_empty_file() -> Result<()> {
        let mut file = tokio::fs::File::from_std(tempfile()?);

        assert_eq!(read_last_line(&mut file).await?, None);
        Ok(())
    }
}
