pub mod arbiter;
pub mod platform;

pub use arbiter::ResolverHookArbiter;
pub use platform::{NoopPlatformHooks, PlatformHooks, UnixPlatformHooks};
