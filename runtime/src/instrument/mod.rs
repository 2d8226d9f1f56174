//! Instrumentation installer.
//!
//! Every interception point is an independent install snippet. The composer
//! wraps each one in its own `try/catch`, so a hook that cannot be installed
//! reports a `hook-error` and leaves the others untouched, and skips the ones
//! switched off in [`HookConfig`]. The result is a single bootstrap script
//! registered once per page context, before any page script runs.

pub mod scripts;

use crate::config::HookConfig;

/// Global function page-side code calls to hand a candidate to the engine.
pub const BINDING_NAME: &str = "__blobtapDeliver";

/// One interception point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Fetch,
    Xhr,
    CreateBuffer,
    DecodeAudioData,
    BufferSourceStart,
    ScriptProcessor,
    OfflineRender,
    MutationObserver,
}

impl Hook {
    pub const ALL: [Hook; 8] = [
        Hook::Fetch,
        Hook::Xhr,
        Hook::CreateBuffer,
        Hook::DecodeAudioData,
        Hook::BufferSourceStart,
        Hook::ScriptProcessor,
        Hook::OfflineRender,
        Hook::MutationObserver,
    ];

    /// Name used in config, on the command line, and in `hook-error` reports.
    pub fn name(self) -> &'static str {
        match self {
            Hook::Fetch => "fetch",
            Hook::Xhr => "xhr",
            Hook::CreateBuffer => "create-buffer",
            Hook::DecodeAudioData => "decode-audio-data",
            Hook::BufferSourceStart => "buffer-source-start",
            Hook::ScriptProcessor => "script-processor",
            Hook::OfflineRender => "offline-render",
            Hook::MutationObserver => "mutation-observer",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Hook::Fetch => scripts::FETCH,
            Hook::Xhr => scripts::XHR,
            Hook::CreateBuffer => scripts::CREATE_BUFFER,
            Hook::DecodeAudioData => scripts::DECODE_AUDIO_DATA,
            Hook::BufferSourceStart => scripts::BUFFER_SOURCE_START,
            Hook::ScriptProcessor => scripts::SCRIPT_PROCESSOR,
            Hook::OfflineRender => scripts::OFFLINE_RENDER,
            Hook::MutationObserver => scripts::MUTATION_OBSERVER,
        }
    }

    fn enabled(self, config: &HookConfig) -> bool {
        match self {
            Hook::Fetch => config.fetch,
            Hook::Xhr => config.xhr,
            Hook::CreateBuffer => config.create_buffer,
            Hook::DecodeAudioData => config.decode_audio_data,
            Hook::BufferSourceStart => config.buffer_source_start,
            Hook::ScriptProcessor => config.script_processor,
            Hook::OfflineRender => config.offline_render,
            Hook::MutationObserver => config.mutation_observer,
        }
    }

    /// The install snippet wrapped in its own guard.
    pub fn install_snippet(self) -> String {
        format!(
            "  try {{\n    (function (bt) {{{body}}})(bt);\n  }} catch (e) {{\n    bt.hookError({name:?}, e);\n  }}\n",
            body = self.source(),
            name = self.name(),
        )
    }
}

/// Hooks that `config` switches on, in install order.
pub fn enabled_hooks(config: &HookConfig) -> Vec<Hook> {
    Hook::ALL
        .into_iter()
        .filter(|hook| hook.enabled(config))
        .collect()
}

/// Compose the bootstrap script for one page context.
pub fn compose_bootstrap(config: &HookConfig) -> String {
    let mut script = String::from(
        "(function () {\n  if (window.__blobtapInstalled) { return; }\n  \
         Object.defineProperty(window, '__blobtapInstalled', { value: true });\n",
    );
    script.push_str(&scripts::PRELUDE.replace(scripts::BINDING_PLACEHOLDER, BINDING_NAME));
    for hook in enabled_hooks(config) {
        script.push_str(&hook.install_snippet());
    }
    script.push_str("})();\n");
    script
}
