//! Page-side JavaScript sources.
//!
//! Each hook body runs inside `function (bt) { ... }` where `bt` is the
//! reporting object built by [`PRELUDE`]. A hook signals that it cannot be
//! installed by throwing; the composer catches and reports it.

/// Placeholder replaced with the binding name when composing.
pub const BINDING_PLACEHOLDER: &str = "__BINDING__";

/// Reporting helpers shared by every hook. Evaluates to the `bt` object.
pub const PRELUDE: &str = r#"
  const bindingName = "__BINDING__";
  const pending = [];
  let flushTimer = null;
  const flush = () => {
    const fn = window[bindingName];
    if (typeof fn !== 'function') {
      if (flushTimer === null) {
        flushTimer = setTimeout(() => { flushTimer = null; flush(); }, 250);
      }
      return;
    }
    while (pending.length > 0) {
      try { fn(pending.shift()); } catch (_) {}
    }
  };
  const deliver = (message) => {
    try { pending.push(JSON.stringify(message)); } catch (_) { return; }
    flush();
  };
  const isToken = (value) => typeof value === 'string' && /^data:[^;]+;base64,/i.test(value);
  const CSS_URL = /url\(\s*['"]?(data:[^'")\s]+)/gi;
  // Float32Array storage is little-endian on every platform Chromium ships on.
  const packF32 = (data) => {
    const bytes = new Uint8Array(data.buffer, data.byteOffset, data.byteLength);
    let binary = '';
    for (let i = 0; i < bytes.length; i += 0x8000) {
      binary += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
    }
    return btoa(binary);
  };
  const bt = {
    token(value, channel) {
      if (isToken(value)) {
        deliver({ kind: 'inline', channel, token: value });
      }
    },
    scanValue(value, channel) {
      if (typeof value !== 'string' || value.indexOf('data:') === -1) return;
      if (isToken(value)) {
        bt.token(value, channel);
        return;
      }
      CSS_URL.lastIndex = 0;
      let match;
      while ((match = CSS_URL.exec(value)) !== null) {
        bt.token(match[1], channel);
      }
    },
    audio(buffer, source) {
      try {
        if (!buffer || typeof buffer.getChannelData !== 'function') return;
        const channels = [];
        for (let c = 0; c < buffer.numberOfChannels; c++) {
          channels.push(packF32(buffer.getChannelData(c)));
        }
        deliver({
          kind: 'audio',
          channel: 'interception',
          source,
          sampleRate: buffer.sampleRate,
          frameCount: buffer.length,
          channelCount: buffer.numberOfChannels,
          channels,
        });
      } catch (e) {
        bt.hookError(source, e);
      }
    },
    hookError(hook, e) {
      deliver({ kind: 'hook-error', hook, message: String((e && e.message) || e) });
    },
  };
"#;

/// Asynchronous network calls.
pub const FETCH: &str = r#"
  const original = window.fetch;
  if (typeof original !== 'function') throw new Error('fetch is not available');
  window.fetch = function (input, init) {
    try {
      const isRequest = typeof Request !== 'undefined' && input instanceof Request;
      bt.token(String(isRequest ? input.url : input), 'interception');
    } catch (_) {}
    return original.apply(this, arguments);
  };
"#;

/// Legacy synchronous/asynchronous XMLHttpRequest.
pub const XHR: &str = r#"
  const proto = window.XMLHttpRequest && window.XMLHttpRequest.prototype;
  if (!proto || typeof proto.open !== 'function') throw new Error('XMLHttpRequest is not available');
  const open = proto.open;
  proto.open = function (method, url) {
    try { bt.token(String(url), 'interception'); } catch (_) {}
    return open.apply(this, arguments);
  };
"#;

/// Buffers created empty and filled by script. Reported after the current
/// task so that synchronous fills are visible.
pub const CREATE_BUFFER: &str = r#"
  const Base = window.BaseAudioContext || window.AudioContext || window.webkitAudioContext;
  if (!Base || typeof Base.prototype.createBuffer !== 'function') throw new Error('createBuffer is not available');
  const create = Base.prototype.createBuffer;
  Base.prototype.createBuffer = function () {
    const buffer = create.apply(this, arguments);
    setTimeout(() => bt.audio(buffer, 'createBuffer'), 0);
    return buffer;
  };
"#;

/// Buffers decoded from encoded bytes, promise and callback forms.
pub const DECODE_AUDIO_DATA: &str = r#"
  const Base = window.BaseAudioContext || window.AudioContext || window.webkitAudioContext;
  if (!Base || typeof Base.prototype.decodeAudioData !== 'function') throw new Error('decodeAudioData is not available');
  const decode = Base.prototype.decodeAudioData;
  Base.prototype.decodeAudioData = function (data, success, failure) {
    const hasCallback = typeof success === 'function';
    const args = Array.prototype.slice.call(arguments);
    if (hasCallback) {
      args[1] = function (buffer) {
        bt.audio(buffer, 'decodeAudioData');
        return success.apply(this, arguments);
      };
    }
    const result = decode.apply(this, args);
    if (!hasCallback && result && typeof result.then === 'function') {
      result.then((buffer) => bt.audio(buffer, 'decodeAudioData'), () => {});
    }
    return result;
  };
"#;

/// Playback start of a buffer source node.
pub const BUFFER_SOURCE_START: &str = r#"
  const Source = window.AudioBufferSourceNode;
  if (!Source || typeof Source.prototype.start !== 'function') throw new Error('AudioBufferSourceNode is not available');
  const start = Source.prototype.start;
  Source.prototype.start = function () {
    try { bt.audio(this.buffer, 'bufferSourceStart'); } catch (_) {}
    return start.apply(this, arguments);
  };
"#;

/// Legacy script-processing node callbacks, both the property and listener forms.
pub const SCRIPT_PROCESSOR: &str = r#"
  const Proc = window.ScriptProcessorNode;
  if (!Proc) throw new Error('ScriptProcessorNode is not available');
  const desc = Object.getOwnPropertyDescriptor(Proc.prototype, 'onaudioprocess');
  if (!desc || typeof desc.set !== 'function') throw new Error('onaudioprocess is not configurable');
  const wrap = (handler) => function (event) {
    const result = handler.apply(this, arguments);
    try { bt.audio(event.outputBuffer, 'scriptProcessor'); } catch (_) {}
    return result;
  };
  const raw = new WeakMap();
  Object.defineProperty(Proc.prototype, 'onaudioprocess', {
    configurable: true,
    enumerable: desc.enumerable,
    get() {
      return raw.has(this) ? raw.get(this) : desc.get.call(this);
    },
    set(handler) {
      raw.set(this, handler);
      desc.set.call(this, typeof handler === 'function' ? wrap(handler) : handler);
    },
  });
  const listeners = new WeakMap();
  const add = Proc.prototype.addEventListener;
  const remove = Proc.prototype.removeEventListener;
  Proc.prototype.addEventListener = function (type, listener, options) {
    if (type === 'audioprocess' && typeof listener === 'function') {
      if (!listeners.has(listener)) listeners.set(listener, wrap(listener));
      return add.call(this, type, listeners.get(listener), options);
    }
    return add.apply(this, arguments);
  };
  Proc.prototype.removeEventListener = function (type, listener, options) {
    if (type === 'audioprocess' && listeners.has(listener)) {
      return remove.call(this, type, listeners.get(listener), options);
    }
    return remove.apply(this, arguments);
  };
"#;

/// Offline rendering completion.
pub const OFFLINE_RENDER: &str = r#"
  const Offline = window.OfflineAudioContext || window.webkitOfflineAudioContext;
  if (!Offline || typeof Offline.prototype.startRendering !== 'function') throw new Error('OfflineAudioContext is not available');
  const render = Offline.prototype.startRendering;
  Offline.prototype.startRendering = function () {
    const result = render.apply(this, arguments);
    if (result && typeof result.then === 'function') {
      result.then((buffer) => bt.audio(buffer, 'offlineRender'), () => {});
    } else {
      this.addEventListener('complete', (event) => bt.audio(event.renderedBuffer, 'offlineRender'));
    }
    return result;
  };
"#;

/// Structural change listener: newly added elements, their descendants, and
/// changed attributes.
pub const MUTATION_OBSERVER: &str = r#"
  if (typeof MutationObserver !== 'function') throw new Error('MutationObserver is not available');
  const ATTRS = ['src', 'href', 'style', 'poster'];
  const scanElement = (el) => {
    if (!el || el.nodeType !== 1) return;
    for (const attr of ATTRS) {
      bt.scanValue(el.getAttribute(attr), 'mutation');
    }
  };
  const observer = new MutationObserver((records) => {
    for (const record of records) {
      if (record.type === 'attributes') {
        scanElement(record.target);
        continue;
      }
      for (const node of record.addedNodes) {
        if (node.nodeType !== 1) continue;
        scanElement(node);
        if (typeof node.querySelectorAll === 'function') {
          node.querySelectorAll('*').forEach(scanElement);
        }
      }
    }
  });
  observer.observe(document, { childList: true, subtree: true, attributes: true, attributeFilter: ATTRS });
"#;

/// Full-document walk evaluated on demand. Returns every attribute value and
/// same-origin stylesheet rule that mentions `data:`; the engine extracts
/// tokens from them.
pub const DOCUMENT_SCAN: &str = r#"
(() => {
  const values = [];
  const push = (value) => {
    if (typeof value === 'string' && value.indexOf('data:') !== -1) values.push(value);
  };
  const selector = 'img[src], source[src], audio[src], video[src], embed[src], input[src], '
    + 'link[href], image[href], [style], [poster]';
  document.querySelectorAll(selector).forEach((el) => {
    push(el.getAttribute('src'));
    push(el.getAttribute('href'));
    push(el.getAttribute('style'));
    push(el.getAttribute('poster'));
  });
  for (const sheet of Array.from(document.styleSheets)) {
    let rules = null;
    try { rules = sheet.cssRules; } catch (_) { continue; }
    if (!rules) continue;
    for (const rule of Array.from(rules)) push(rule.cssText);
  }
  return { values, elements: document.getElementsByTagName('*').length };
})()
"#;
