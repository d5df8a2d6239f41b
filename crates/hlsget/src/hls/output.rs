// HLS List Writer: emits the ordered segment list in ffmpeg concat-demuxer syntax.

use crate::hls::HlsDownloaderError;
use crate::hls::scheduler::FinishedTask;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// One concat-list entry: `file '<path>'`, with embedded single quotes written
/// as `'\''`.
pub fn concat_line(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{escaped}'")
}

/// Write one line per finished segment, in the given order.
pub async fn write_concat_list(
    tasks: &[FinishedTask],
    list_path: &Path,
) -> Result<(), HlsDownloaderError> {
    let file = tokio::fs::File::create(list_path).await?;
    let mut writer = BufWriter::new(file);
    for finished in tasks {
        writer
            .write_all(concat_line(&finished.path).as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;

    debug!(entries = tasks.len(), path = %list_path.display(), "Concat list written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::playlist::SegmentDescriptor;
    use crate::hls::scheduler::Task;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn finished(index: usize, path: PathBuf) -> FinishedTask {
        FinishedTask {
            task: Task {
                index,
                segment: SegmentDescriptor {
                    index,
                    uri: format!("{index}.ts"),
                    key_override: None,
                    duration: 6.0,
                },
            },
            path,
        }
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(
            concat_line(Path::new("/tmp/it's here/0.ts")),
            r"file '/tmp/it'\''s here/0.ts'"
        );
        assert_eq!(concat_line(Path::new("/tmp/ws/1.ts")), "file '/tmp/ws/1.ts'");
    }

    #[tokio::test]
    async fn one_line_per_segment_in_order() {
        let workspace = TempDir::new().unwrap();
        let tasks: Vec<_> = (0..4)
            .map(|i| finished(i, workspace.path().join(format!("{i}.ts"))))
            .collect();
        let list_path = workspace.path().join("list.txt");

        write_concat_list(&tasks, &list_path).await.unwrap();

        let written = std::fs::read_to_string(&list_path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 4);
        for (i, line) in lines.iter().enumerate() {
            let expected = workspace.path().join(format!("{i}.ts"));
            assert_eq!(*line, concat_line(&expected));
        }
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_io_error() {
        let workspace = TempDir::new().unwrap();
        let list_path = workspace.path().join("missing-dir").join("list.txt");

        let err = write_concat_list(&[], &list_path).await.unwrap_err();
        assert!(matches!(err, HlsDownloaderError::IoError { .. }));
    }
}
