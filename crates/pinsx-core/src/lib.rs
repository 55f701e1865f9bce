pub mod context_pool;
pub mod dependency;
pub mod enumeration;
pub mod error;
pub mod explore;
pub mod guarded;
pub mod guarded_expr;
pub mod host;
pub mod lts;
pub mod lts_type;
pub mod model;
pub mod provider;
pub mod recording_host;
pub mod state_codec;
pub mod types;

pub use context_pool::{ContextPool, WorkerId};
pub use dependency::{DependencyMatrices, DependencyMatrix, DependencyPolicy, SlotDependencies};
pub use enumeration::{EnumerationRegistry, BOOL_FALSE, BOOL_TRUE};
pub use error::{
    interpret_exit_code, ProviderError, EXIT_OK, EXIT_PROPERTY_VIOLATED, EXIT_PROVIDER_FAILURE,
};
pub use explore::{explore, ExploreError, ExploreOptions, ExploreOutcome};
pub use guarded::{plugin, GuardedContext, GuardedLoader, GuardedModel, ModelDefinition};
pub use guarded_expr::Expr;
pub use host::{Abort, Host};
pub use lts::{LabelProvider, TransitionCallback, TransitionInfo, TransitionProvider};
pub use lts_type::{LtsType, LtsTypeBuilder, TypeFormat, TypeId};
pub use model::{ExecutionContext, ModelLoader, ModelTemplate};
pub use provider::{load_model, LoadSession, LoadedModel, LoaderRecord, Plugin, ProviderOptions};
pub use recording_host::{AbortLatch, RecordingHost, Registration};
pub use state_codec::{SlotCodec, StateCodec, StateVector};
pub use types::{Reason, ReasonKind, Stats, Status};
