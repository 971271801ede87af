// auth-plugin-sdk
// Decision logic shared by gateway authentication plugins

// Error taxonomy
pub mod error;

// Redirect target resolution and open-redirect guard
pub mod redirect;

// External profiles and session principals
pub mod identity;

// Directory service client
pub mod directory;

// Lookup-or-create linking and its extension hooks
pub mod hooks;
pub mod linker;

// Server-side session transport
pub mod session;

// Provider callback state machine and login routes
pub mod flow;

// Plugin metadata advertised to the gateway
pub mod plugin;

pub use error::AuthError;
pub use flow::{login_routes, CallbackParams, LoginFlow, ProviderStrategy};
pub use identity::{ExternalProfile, Principal};
pub use linker::IdentityLinker;
pub use redirect::RedirectPolicy;
pub use session::{session_middleware, Session, SessionManager};
