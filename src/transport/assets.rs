//! Script assets evaluated inside every realm.
//!
//! The firmware is a function expression. The host calls it once with its
//! native ports and gets back the realm client:
//!
//! ```text
//! (emit, schedule, cancel, log, debug) -> { boot, dispatch, fire }
//! ```
//!
//! The ports stay closure parameters of the firmware and are never bound to
//! a global, so user code cannot reach them. Scripts only see the `bridge`
//! argument passed to the bootstrap and the timer globals.
//!
//! # Frame Documents
//!
//! The frame backend loads a single document that embeds the firmware and
//! the bootstrap and boots immediately, the same way a page would.

// ============================================================================
// Public Functions
// ============================================================================

/// Returns the firmware function expression.
#[inline]
#[must_use]
pub fn firmware() -> &'static str {
    FIRMWARE
}

/// Builds the frame document for a bootstrap.
///
/// Evaluating the document yields a function with the firmware signature
/// that also runs the bootstrap before returning the client.
#[must_use]
pub fn build_frame_document(bootstrap: &str, ready_event: &str) -> String {
    // JSON string literals are valid script string literals.
    let bootstrap_literal = serde_json::Value::from(bootstrap).to_string();
    let ready_literal = serde_json::Value::from(ready_event).to_string();

    FRAME_DOCUMENT_TEMPLATE
        .replace("$FIRMWARE", FIRMWARE)
        .replace("$READY_EVENT", &ready_literal)
        .replace("$BOOTSTRAP", &bootstrap_literal)
}

// ============================================================================
// Constants
// ============================================================================

/// Frame document template.
///
/// Placeholders: `$FIRMWARE`, `$READY_EVENT`, `$BOOTSTRAP`. `$BOOTSTRAP` is
/// substituted last so user code is never scanned for placeholders.
const FRAME_DOCUMENT_TEMPLATE: &str = r#"(function (emit, schedule, cancel, log, debug) {
    var client = ($FIRMWARE)(emit, schedule, cancel, log, debug);
    client.boot($BOOTSTRAP, $READY_EVENT);
    return client;
})"#;

/// Realm firmware.
///
/// Contains the value codec (the same wire layout as the host codec), the
/// `bridge` event object handed to the bootstrap, the timer globals backed by
/// host timers, and an optional console forwarding to the host log.
const FIRMWARE: &str = r#"(function (emit, schedule, cancel, log, debug) {
    'use strict';

    var global = globalThis,
        slice = Array.prototype.slice,
        hasOwn = Object.prototype.hasOwnProperty;

    // ------------------------------------------------------------------
    // Codec
    // ------------------------------------------------------------------

    var encode = function (value) {
        var nodes = [null],
            seen = new Map(),
            strings = new Map(),
            pending = [],
            head = 0;

        var slot = function (item) {
            switch (typeof item) {
                case 'number':
                    return isFinite(item) ? item : null;
                case 'boolean':
                    return item;
                case 'bigint':
                    return slot(Number(item));
                case 'string':
                    if (!strings.has(item)) {
                        strings.set(item, nodes.length);
                        nodes.push(item);
                    }
                    return String(strings.get(item));
                case 'object':
                    if (item === null) {
                        return null;
                    }
                    if (!seen.has(item)) {
                        if (!Array.isArray(item) && typeof item.toJSON === 'function') {
                            var replaced = item.toJSON();
                            if (replaced !== item) {
                                return slot(replaced);
                            }
                        }
                        seen.set(item, nodes.length);
                        nodes.push(null);
                        pending.push(item);
                    }
                    return String(seen.get(item));
                default:
                    return [];
            }
        };

        nodes[0] = slot(value);

        while (head < pending.length) {
            var item = pending[head],
                node,
                keys,
                i;

            head += 1;

            if (Array.isArray(item)) {
                node = [];
                for (i = 0; i < item.length; i++) {
                    node.push(slot(item[i]));
                }
            }
            else {
                node = Object.create(null);
                if (item instanceof Error) {
                    node.name = slot(item.name);
                    node.message = slot(item.message);
                    node.stack = slot(item.stack);
                }
                keys = Object.keys(item);
                for (i = 0; i < keys.length; i++) {
                    node[keys[i]] = slot(item[keys[i]]);
                }
            }

            nodes[seen.get(item)] = node;
        }

        return JSON.stringify(nodes);
    };

    var decode = function (text) {
        var wire = JSON.parse(text),
            nodes = [],
            i,
            k;

        if (!Array.isArray(wire) || !wire.length) {
            throw new TypeError('bridge: malformed message');
        }

        var resolve = function (item) {
            if (typeof item === 'string') {
                var index = Number(item);
                if (!(index >= 1 && index < wire.length) || index % 1) {
                    throw new TypeError('bridge: invalid reference ' + item);
                }
                return nodes[index];
            }
            if (Array.isArray(item)) {
                return undefined;
            }
            return item;
        };

        for (i = 1; i < wire.length; i++) {
            nodes[i] = typeof wire[i] === 'string' ? wire[i] : (Array.isArray(wire[i]) ? [] : {});
        }

        for (i = 1; i < wire.length; i++) {
            var node = wire[i],
                target = nodes[i];

            if (Array.isArray(node)) {
                for (k = 0; k < node.length; k++) {
                    target.push(resolve(node[k]));
                }
            }
            else if (node && typeof node === 'object') {
                for (k in node) {
                    if (hasOwn.call(node, k)) {
                        target[k] = resolve(node[k]);
                    }
                }
            }
        }

        return resolve(wire[0]);
    };

    // ------------------------------------------------------------------
    // Bridge
    // ------------------------------------------------------------------

    var listeners = Object.create(null);

    var bridge = {
        on: function (name, listener) {
            if (typeof listener !== 'function') {
                return;
            }
            (listeners[name] || (listeners[name] = [])).push({ listener: listener, once: false });
        },

        once: function (name, listener) {
            if (typeof listener !== 'function') {
                return;
            }
            (listeners[name] || (listeners[name] = [])).push({ listener: listener, once: true });
        },

        off: function (name, listener) {
            if (!listeners[name]) {
                return;
            }
            if (!listener) {
                delete listeners[name];
                return;
            }
            listeners[name] = listeners[name].filter(function (entry) {
                return entry.listener !== listener;
            });
        },

        emit: function (name) {
            var entries = listeners[name],
                args = slice.call(arguments, 1),
                i;

            if (!entries || !entries.length) {
                return;
            }

            listeners[name] = entries.filter(function (entry) {
                return !entry.once;
            });

            for (i = 0; i < entries.length; i++) {
                entries[i].listener.apply(bridge, args);
            }
        },

        dispatch: function () {
            emit(encode(slice.call(arguments)));
        }
    };

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    var timers = Object.create(null),
        nextTimer = 1;

    var setTimer = function (repeat, callback, delay, args) {
        if (typeof callback !== 'function') {
            return;
        }

        var id = nextTimer;
        nextTimer += 1;

        delay = Number(delay);
        if (!(delay > 0)) {
            delay = 0;
        }

        timers[id] = { callback: callback, args: args, repeat: repeat };
        schedule(id, delay, repeat);

        return id;
    };

    var clearTimer = function (id) {
        if (timers[id]) {
            delete timers[id];
            cancel(Number(id));
        }
    };

    global.setTimeout = function (callback, delay) {
        return setTimer(false, callback, delay, slice.call(arguments, 2));
    };

    global.setInterval = function (callback, delay) {
        return setTimer(true, callback, delay, slice.call(arguments, 2));
    };

    global.setImmediate = function (callback) {
        return setTimer(false, callback, 0, slice.call(arguments, 1));
    };

    global.clearTimeout = function (id) { clearTimer(id); };
    global.clearInterval = function (id) { clearTimer(id); };
    global.clearImmediate = function (id) { clearTimer(id); };

    // ------------------------------------------------------------------
    // Console
    // ------------------------------------------------------------------

    if (debug) {
        var format = function (args) {
            return slice.call(args).map(function (arg) {
                if (typeof arg === 'string') {
                    return arg;
                }
                try {
                    return JSON.stringify(arg);
                }
                catch (e) {
                    return String(arg);
                }
            }).join(' ');
        };

        global.console = {};
        ['log', 'info', 'warn', 'error', 'debug'].forEach(function (level) {
            global.console[level] = function () {
                log(level, format(arguments));
            };
        });
    }

    // ------------------------------------------------------------------
    // Client
    // ------------------------------------------------------------------

    return {
        boot: function (code, ready) {
            (new Function('bridge', code)).call(global, bridge);
            emit(encode([ready]));
        },

        dispatch: function (text) {
            bridge.emit.apply(bridge, decode(text));
        },

        fire: function (id) {
            var timer = timers[id];
            if (!timer) {
                return;
            }
            if (!timer.repeat) {
                delete timers[id];
            }
            timer.callback.apply(global, timer.args);
        }
    };
})"#;

// ============================================================================
// Tests
// ============================================================================
