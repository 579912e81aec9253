use std::path::PathBuf;
use std::sync::Arc;

use common::client::ObjectClient;
use object_store::{StoreClient, StoreSetupError};

use bucketfs_daemon::{AppState, BucketFs, MountError, StateError};

/// Shared inputs for every command
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Work directory override; the platform data directory otherwise
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("remote setup failed: {0}")]
    Store(#[from] StoreSetupError),
    #[error("mount failed: {0}")]
    Mount(#[from] MountError),
}

impl OpContext {
    pub fn new(work_dir: Option<PathBuf>) -> Self {
        Self { work_dir }
    }

    pub fn state(&self) -> Result<AppState, StateError> {
        AppState::load(self.work_dir.clone())
    }

    /// Load the work directory and mount its configured remote
    pub fn mount(&self) -> Result<BucketFs, ContextError> {
        let state = self.state()?;
        let client: Arc<dyn ObjectClient> = Arc::new(StoreClient::from_config(&state.config.remote)?);
        Ok(BucketFs::from_state(&state, client)?)
    }
}

pub trait Op {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display;

    fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Subcommand enum plus output/error enums dispatching to each op
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $op:ty)),+ $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($op),)+
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$op as $crate::cli::op::Op>::Output),)+
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => write!(f, "{output}"),)+
                }
            }
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$op as $crate::cli::op::Op>::Error),
            )+
        }

        impl $crate::cli::op::Op for Command {
            type Error = OpError;
            type Output = OpOutput;

            fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<Self::Output, Self::Error> {
                match self {
                    $(Command::$variant(op) => op
                        .execute(ctx)
                        .map(OpOutput::$variant)
                        .map_err(OpError::$variant),)+
                }
            }
        }
    };
}
