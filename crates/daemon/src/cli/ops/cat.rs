use std::fmt;
use std::io::{self, Write};

use clap::Args;

use bucketfs_daemon::{BucketFs, FsError, OpenContext};
use common::object::ObjectIdentity;

use crate::cli::op::ContextError;

const READ_CHUNK: usize = 256 * 1024;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// File to read, e.g. /bucket/notes.txt
    pub path: String,

    /// Print the content as hex instead of raw bytes
    #[arg(long)]
    pub hex: bool,
}

/// Content goes straight to stdout, so there is nothing left to print
#[derive(Debug)]
pub struct CatOutput {
    pub path: String,
    pub size: u64,
}

impl fmt::Display for CatOutput {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

fn copy_chunks(
    fs: &BucketFs,
    context: &OpenContext,
    hex: bool,
    out: &mut impl Write,
) -> Result<u64, CatError> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut offset = 0u64;
    loop {
        let n = fs.read(context, offset, &mut buf)?;
        if n == 0 {
            break;
        }
        if hex {
            out.write_all(hex::encode(&buf[..n]).as_bytes())?;
        } else {
            out.write_all(&buf[..n])?;
        }
        offset += n as u64;
    }
    if hex && offset > 0 {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(offset)
}

/// Copy the file at `identity` into `out`; returns the number of bytes read
pub fn stream(
    fs: &BucketFs,
    identity: &ObjectIdentity,
    hex: bool,
    out: &mut impl Write,
) -> Result<u64, CatError> {
    let context = fs.open_for_read(identity)?;
    let copied = if context.is_directory() {
        Err(FsError::IsADirectory(identity.to_string()).into())
    } else {
        copy_chunks(fs, &context, hex, out)
    };
    fs.close(context)?;
    copied
}

impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = CatOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let identity = ObjectIdentity::parse_namespace_path(&self.path).map_err(FsError::from)?;
        let fs = ctx.mount()?;
        let copied = stream(&fs, &identity, self.hex, &mut io::stdout().lock());
        fs.unmount();
        let size = copied?;
        tracing::debug!(path = %self.path, size, "streamed file");

        Ok(CatOutput {
            path: self.path.clone(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::client::MemoryClient;

    use bucketfs_daemon::Config;

    use super::*;

    fn mounted() -> (BucketFs, tempfile::TempDir) {
        let client = Arc::new(MemoryClient::new());
        client.put_bytes("b", "small.txt", "hello\n");
        let large: Vec<u8> = (0..READ_CHUNK as u32 * 2 + 5).map(|i| (i % 7) as u8).collect();
        client.put_bytes("b", "large.bin", large);
        client.put_bytes("b", "dir/inner.txt", "x");

        let dir = tempfile::tempdir().unwrap();
        let fs = BucketFs::mount(
            client,
            Config::default(),
            dir.path().join("cache"),
            dir.path().join("reports"),
        )
        .unwrap();
        (fs, dir)
    }

    fn id(path: &str) -> ObjectIdentity {
        ObjectIdentity::parse_namespace_path(path).unwrap()
    }

    #[test]
    fn test_stream_copies_every_chunk() {
        let (fs, _dir) = mounted();
        let mut out = Vec::new();
        let size = stream(&fs, &id("/b/large.bin"), false, &mut out).unwrap();
        assert_eq!(size, READ_CHUNK as u64 * 2 + 5);
        assert_eq!(out.len(), READ_CHUNK * 2 + 5);
        assert_eq!(out[READ_CHUNK + 3], ((READ_CHUNK + 3) % 7) as u8);
        fs.unmount();
    }

    #[test]
    fn test_stream_hex_and_directories() {
        let (fs, _dir) = mounted();
        let mut out = Vec::new();
        stream(&fs, &id("/b/small.txt"), true, &mut out).unwrap();
        assert_eq!(out, b"68656c6c6f0a\n");

        let err = stream(&fs, &id("/b/dir"), false, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CatError::Fs(FsError::IsADirectory(_))));
        assert!(CatOutput {
            path: "/b/small.txt".to_string(),
            size: 6,
        }
        .to_string()
        .is_empty());
        fs.unmount();
    }
}
