use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use bucketfs_daemon::FsError;
use common::object::ObjectIdentity;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Report {
    /// Paths to stat first, so the report has something to show
    pub warm: Vec<String>,
}

#[derive(Debug)]
pub struct ReportOutput {
    pub path: PathBuf,
    pub positive: usize,
    pub negative: usize,
}

impl fmt::Display for ReportOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "Wrote".green().bold(), self.path.display())?;
        write!(
            f,
            "  {} {} positive, {} negative",
            "Object cache:".dimmed(),
            self.positive,
            self.negative
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl crate::cli::op::Op for Report {
    type Error = ReportError;
    type Output = ReportOutput;

    fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let fs = ctx.mount()?;
        for path in &self.warm {
            let identity = ObjectIdentity::parse_namespace_path(path).map_err(FsError::from)?;
            if let Err(e) = fs.stat(&identity) {
                tracing::info!(path = %identity, error = %e, "warm-up stat failed");
            }
        }
        let report = fs.report();
        let path = fs.write_report();
        fs.unmount();
        Ok(ReportOutput {
            path: path?,
            positive: report.objects.positive.len(),
            negative: report.objects.negative.len(),
        })
    }
}
