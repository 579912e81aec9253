use std::fmt;

use clap::Args;
use comfy_table::Table;

use bucketfs_daemon::FsError;
use common::object::{EntryKind, MetadataRecord, ObjectIdentity};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list (defaults to the root, which lists buckets)
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug)]
pub struct LsOutput {
    pub items: Vec<MetadataRecord>,
}

impl fmt::Display for LsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "No items found");
        }

        let mut table = Table::new();
        table.set_header(vec!["TYPE", "NAME", "SIZE", "MODIFIED"]);
        for item in &self.items {
            let type_str = match item.kind() {
                EntryKind::Bucket => "bucket",
                EntryKind::Directory => "dir",
                EntryKind::File => "file",
            };
            table.add_row(vec![
                type_str.to_string(),
                item.name().to_string(),
                item.size().to_string(),
                item.last_write_time().format("%Y-%m-%d %H:%M:%S").to_string(),
            ]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = LsOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let identity = ObjectIdentity::parse_namespace_path(&self.path).map_err(FsError::from)?;
        let fs = ctx.mount()?;
        let items = fs.list_directory(&identity);
        fs.unmount();
        Ok(LsOutput { items: items? })
    }
}
