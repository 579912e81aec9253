use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use bucketfs_daemon::FsError;
use common::object::{EntryKind, MetadataRecord};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Stat {
    /// Namespace path, e.g. /bucket/dir/file.txt
    pub path: String,
}

#[derive(Debug)]
pub struct StatOutput {
    pub path: String,
    pub record: MetadataRecord,
}

impl fmt::Display for StatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = &self.record;
        let kind = match record.kind() {
            EntryKind::Bucket => "bucket",
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
        };
        writeln!(f, "{} {}", "Path:".dimmed(), self.path.bold())?;
        writeln!(f, "  {} {}", "Kind:".dimmed(), kind)?;
        writeln!(f, "  {} {}", "Size:".dimmed(), record.size())?;
        writeln!(f, "  {} {}", "Created:".dimmed(), record.creation_time())?;
        writeln!(f, "  {} {}", "Modified:".dimmed(), record.last_write_time())?;
        let attrs = record.attributes();
        writeln!(
            f,
            "  {} hidden={} readonly={}",
            "Attributes:".dimmed(),
            attrs.hidden,
            attrs.readonly
        )?;
        write!(f, "  {} {:016x}", "Index:".dimmed(), record.index())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl crate::cli::op::Op for Stat {
    type Error = StatError;
    type Output = StatOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let fs = ctx.mount()?;
        let record = fs.stat_path(&self.path);
        fs.unmount();
        Ok(StatOutput {
            path: self.path.clone(),
            record: record?,
        })
    }
}
