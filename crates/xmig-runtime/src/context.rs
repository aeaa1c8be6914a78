//! Attaching threads to the migration runtime
//!
//! A thread must be attached before it can migrate. Attaching builds its
//! `ThreadImage` on the initial ISA and stores the context in thread-local
//! storage; detaching tears it down and drops any pending request along
//! with the registered migration callback.

use std::sync::Arc;

use xmig_core::kprint::{set_log_level, LogLevel};
use xmig_core::{
    kdebug, kinfo, Arch, MigrateResult, ProgramImage, RequestHandle, ThreadToken, Transport,
};

use crate::config::MigrateConfig;
use crate::thread::ThreadImage;
use crate::tls;
use crate::trace;
use crate::transport::LoopbackTransport;

/// Settings for `attach`
#[derive(Clone)]
pub struct AttachOptions {
    program: Arc<ProgramImage>,
    transport: Option<Arc<dyn Transport>>,
    config: Option<MigrateConfig>,
    initial_arch: Arch,
    tls_block: u64,
}

impl AttachOptions {
    /// Defaults: loopback transport, config from the environment, host
    /// ISA, no TLS block
    pub fn new(program: Arc<ProgramImage>) -> Self {
        AttachOptions {
            program,
            transport: None,
            config: None,
            initial_arch: Arch::current(),
            tls_block: 0,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: MigrateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// ISA the thread starts on
    pub fn initial_arch(mut self, arch: Arch) -> Self {
        self.initial_arch = arch;
        self
    }

    /// Start of the thread's static TLS block
    pub fn tls_block(mut self, addr: u64) -> Self {
        self.tls_block = addr;
        self
    }
}

impl core::fmt::Debug for AttachOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttachOptions")
            .field("transport", &self.transport.as_ref().map(|t| t.name()))
            .field("config", &self.config)
            .field("initial_arch", &self.initial_arch)
            .field("tls_block", &format_args!("{:#x}", self.tls_block))
            .finish()
    }
}

/// Migration state of one attached thread
pub struct ThreadContext {
    pub image: ThreadImage,
    pub transport: Arc<dyn Transport>,
    pub config: MigrateConfig,
    pub token: ThreadToken,
}

impl core::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("token", &self.token)
            .field("image", &self.image)
            .field("transport", &self.transport.name())
            .finish()
    }
}

fn current_token() -> ThreadToken {
    ThreadToken::from_raw(nix::sys::pthread::pthread_self() as u64)
}

/// Attach the calling thread
///
/// Returns a handle other threads can use to request migrations.
pub fn attach(opts: AttachOptions) -> MigrateResult<RequestHandle> {
    if tls::is_attached() {
        return Err(xmig_core::MigrateError::AlreadyAttached);
    }
    let config = opts.config.unwrap_or_else(MigrateConfig::from_env);
    config.validate()?;
    if config.debug_logging {
        set_log_level(LogLevel::Debug);
    }
    trace::init(config.trace_capacity);

    let image = ThreadImage::new(opts.initial_arch, opts.program, &config, opts.tls_block)?;
    let token = current_token();
    let transport = opts
        .transport
        .unwrap_or_else(|| Arc::new(LoopbackTransport::new()) as Arc<dyn Transport>);
    kinfo!(
        "attach {} on {} via {}",
        token,
        opts.initial_arch,
        transport.name()
    );

    tls::install_context(ThreadContext {
        image,
        transport,
        config,
        token,
    })?;
    tls::set_current_arch(opts.initial_arch);
    tls::clear_request();
    Ok(RequestHandle::new(tls::pending_state()))
}

/// Detach the calling thread
pub fn detach() -> MigrateResult<()> {
    let ctx = tls::take_context()?;
    tls::clear_request();
    tls::set_default_callback(None);
    tls::reset_current_arch();
    kdebug!("detach {} from {}", ctx.token, ctx.image.arch());
    Ok(())
}

/// Request handle of the calling thread
///
/// Valid whether or not the thread is attached; requests made before
/// attaching are dropped by `attach`.
pub fn request_handle() -> RequestHandle {
    RequestHandle::new(tls::pending_state())
}
