//! C entry points.
//!
//! Fallible calls take `error: *mut *mut c_char`. On failure they return a
//! null pointer or an all-null buffer and, when `error` is not null, store a
//! message there that the caller releases with [`tokenizers_free_string`].
//! On success `*error` is left untouched.

#![allow(non_camel_case_types)]

mod buffer;
mod options;

pub use buffer::{tokenizers_batch_buffer, tokenizers_buffer};
pub use options::{tokenizers_encode_options, tokenizers_options};

use crate::{
    ChatTemplate, Error, Message, Result, Tokenizer, Truncation, TruncationDirection, ABI_VERSION,
};
use options::SizePrefixed;
use std::{
    ffi::{c_char, c_void, CStr, CString},
    panic::{self, AssertUnwindSafe},
    ptr::{null_mut, NonNull},
    slice,
};
use tracing::warn;

const VERSION_CSTR: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Runs `f`, turning a panic into [`Error::InternalEngine`].
fn guard<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".into());
        Err(Error::InternalEngine(msg))
    })
}

/// Guarded call that reports its error through `error` and yields `failed`.
///
/// # Safety
///
/// `error` is null or valid for a pointer write.
unsafe fn call<T>(error: *mut *mut c_char, failed: T, f: impl FnOnce() -> Result<T>) -> T {
    match guard(f) {
        Ok(val) => val,
        Err(e) => {
            warn!("{e}");
            if let Some(error) = error.as_mut() {
                let msg = e.to_string().replace('\0', "");
                *error = CString::new(msg).unwrap_or_default().into_raw();
            }
            failed
        }
    }
}

unsafe fn handle<'a>(ptr: *const c_void) -> Result<&'a Tokenizer> {
    ptr.cast::<Tokenizer>()
        .as_ref()
        .ok_or_else(|| Error::InvalidArgument("null tokenizer".into()))
}

unsafe fn chat_template<'a>(ptr: *const c_void) -> Result<&'a ChatTemplate> {
    ptr.cast::<ChatTemplate>()
        .as_ref()
        .ok_or_else(|| Error::InvalidArgument("null chat template".into()))
}

unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::InvalidArgument(format!("null {what}")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| Error::InvalidArgument(format!("{what} is not UTF-8: {e}")))
}

/// Null reads as `None`.
unsafe fn opt_str_arg<'a>(ptr: *const c_char, what: &str) -> Result<Option<&'a str>> {
    (!ptr.is_null()).then(|| str_arg(ptr, what)).transpose()
}

unsafe fn slice_arg<'a, T>(ptr: *const T, len: usize, what: &str) -> Result<&'a [T]> {
    match NonNull::new(ptr.cast_mut()) {
        Some(ptr) => Ok(slice::from_raw_parts(ptr.as_ptr(), len)),
        None if len == 0 => Ok(&[]),
        None => Err(Error::InvalidArgument(format!("null {what}"))),
    }
}

fn into_handle<T>(val: T) -> *mut c_void {
    Box::into_raw(Box::new(val)).cast()
}

fn into_c_string(s: String) -> Result<*mut c_char> {
    CString::new(s)
        .map(CString::into_raw)
        .map_err(|e| {
            Error::InternalEngine(format!("text holds a NUL byte at {}", e.nul_position()))
        })
}

/// Package version, a static string the caller must not free.
#[no_mangle]
pub extern "C" fn tokenizers_version() -> *const c_char {
    VERSION_CSTR.as_ptr().cast()
}

/// Revision of the structs and signatures in this module.
#[no_mangle]
pub extern "C" fn tokenizers_abi_version() -> u32 {
    ABI_VERSION
}

/// Link-time ABI check: a caller built against another revision references
/// a symbol this library does not export and fails to link.
#[no_mangle]
pub extern "C" fn tokenizers_abi_1() {}

/// Installs the stderr logger, see [`crate::log::init`].
#[no_mangle]
pub extern "C" fn tokenizers_init_logging() {
    crate::log::init()
}

/// # Safety
///
/// `bytes` points to `len` readable bytes. `options` is null or a
/// size-prefixed [`tokenizers_options`].
#[no_mangle]
pub unsafe extern "C" fn tokenizers_from_bytes(
    bytes: *const u8,
    len: usize,
    options: *const tokenizers_options,
    error: *mut *mut c_char,
) -> *mut c_void {
    call(error, null_mut(), || {
        let bytes = slice_arg(bytes, len, "bytes")?;
        let options = tokenizers_options::read(options).into();
        Tokenizer::from_bytes(bytes, &options).map(into_handle)
    })
}

/// `direction` is 0 to drop from the start, 1 to drop from the end.
///
/// # Safety
///
/// `bytes` points to `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_from_bytes_with_truncation(
    bytes: *const u8,
    len: usize,
    max_len: usize,
    direction: u8,
    error: *mut *mut c_char,
) -> *mut c_void {
    call(error, null_mut(), || {
        let bytes = slice_arg(bytes, len, "bytes")?;
        let truncation = Truncation::new(max_len, TruncationDirection::try_from(direction)?)?;
        Tokenizer::from_bytes_with_truncation(bytes, truncation).map(into_handle)
    })
}

/// # Safety
///
/// `path` is a NUL-terminated string. `options` is null or a size-prefixed
/// [`tokenizers_options`].
#[no_mangle]
pub unsafe extern "C" fn tokenizers_from_file(
    path: *const c_char,
    options: *const tokenizers_options,
    error: *mut *mut c_char,
) -> *mut c_void {
    call(error, null_mut(), || {
        let path = str_arg(path, "path")?;
        let options = tokenizers_options::read(options).into();
        Tokenizer::from_path(path, &options).map(into_handle)
    })
}

/// Loads a base64 rank file, its `tokenizer_config.json` and a split pattern.
///
/// # Safety
///
/// All three arguments are NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_from_tiktoken(
    model_file: *const c_char,
    config_file: *const c_char,
    pattern: *const c_char,
    error: *mut *mut c_char,
) -> *mut c_void {
    call(error, null_mut(), || {
        let model_file = str_arg(model_file, "model file")?;
        let config_file = str_arg(config_file, "config file")?;
        let pattern = str_arg(pattern, "pattern")?;
        Tokenizer::from_model_files(model_file, config_file, pattern).map(into_handle)
    })
}

/// 0 for a null handle.
///
/// # Safety
///
/// `ptr` is null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_vocab_size(ptr: *mut c_void) -> u32 {
    handle(ptr).map_or(0, |t| t.vocab_size() as u32)
}

/// # Safety
///
/// `ptr` is a live handle, `text` a NUL-terminated string and `options` null
/// or a size-prefixed [`tokenizers_encode_options`].
#[no_mangle]
pub unsafe extern "C" fn tokenizers_encode(
    ptr: *mut c_void,
    text: *const c_char,
    options: *const tokenizers_encode_options,
    error: *mut *mut c_char,
) -> tokenizers_buffer {
    call(error, tokenizers_buffer::empty(), || {
        let tokenizer = handle(ptr)?;
        let text = str_arg(text, "text")?;
        let options = tokenizers_encode_options::read(options).into();
        tokenizer.encode(text, &options).map(Into::into)
    })
}

/// Encodes `count` texts. Any failing text fails the whole call and no
/// buffer is returned.
///
/// # Safety
///
/// `ptr` is a live handle, `texts` points to `count` NUL-terminated strings
/// and `options` is null or a size-prefixed [`tokenizers_encode_options`].
#[no_mangle]
pub unsafe extern "C" fn tokenizers_encode_batch(
    ptr: *mut c_void,
    texts: *const *const c_char,
    count: usize,
    options: *const tokenizers_encode_options,
    error: *mut *mut c_char,
) -> tokenizers_batch_buffer {
    call(error, tokenizers_batch_buffer::empty(), || {
        let tokenizer = handle(ptr)?;
        let texts = slice_arg(texts, count, "texts")?
            .iter()
            .enumerate()
            .map(|(i, &text)| str_arg(text, "text").map_err(|e| e.in_batch(i)))
            .collect::<Result<Vec<_>>>()?;
        let options = tokenizers_encode_options::read(options).into();
        tokenizer.encode_batch(&texts, &options).map(Into::into)
    })
}

/// # Safety
///
/// `ptr` is a live handle and `ids` points to `len` ids.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_decode(
    ptr: *mut c_void,
    ids: *const u32,
    len: usize,
    skip_special_tokens: bool,
    error: *mut *mut c_char,
) -> *mut c_char {
    call(error, null_mut(), || {
        let tokenizer = handle(ptr)?;
        let ids = slice_arg(ids, len, "ids")?;
        into_c_string(tokenizer.decode(ids, skip_special_tokens)?)
    })
}

/// Surface form of `id`, or null when `id` is not in the vocabulary.
/// Release with [`tokenizers_free_string`].
///
/// # Safety
///
/// `ptr` is a live handle.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_id_to_token(ptr: *mut c_void, id: u32) -> *mut c_char {
    call(null_mut(), null_mut(), || {
        match handle(ptr)?.id_to_token(id) {
            Some(token) => into_c_string(token),
            None => Ok(null_mut()),
        }
    })
}

/// Writes the id of `token` to `*id` and returns `true` when found.
///
/// # Safety
///
/// `ptr` is a live handle, `token` a NUL-terminated string and `id` valid for
/// a write.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_token_to_id(
    ptr: *mut c_void,
    token: *const c_char,
    id: *mut u32,
) -> bool {
    call(null_mut(), false, || {
        let found = handle(ptr)?.token_to_id(str_arg(token, "token")?);
        match (found, id.as_mut()) {
            (Some(found), Some(id)) => {
                *id = found;
                Ok(true)
            }
            _ => Ok(false),
        }
    })
}

/// # Safety
///
/// `ptr` is null or a handle that no other call is using. It must not be
/// used afterwards.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_free_tokenizer(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr.cast::<Tokenizer>()));
    }
}

/// Compiles a Jinja chat template. `bos_token` and `eos_token` may be null.
/// Release with [`tokenizers_free_chat_template`].
///
/// # Safety
///
/// `template` is a NUL-terminated string, the tokens null or NUL-terminated
/// strings.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_new_chat_template(
    template: *const c_char,
    bos_token: *const c_char,
    eos_token: *const c_char,
    error: *mut *mut c_char,
) -> *mut c_void {
    call(error, null_mut(), || {
        let template = str_arg(template, "template")?;
        let bos_token = opt_str_arg(bos_token, "bos token")?.map(String::from);
        let eos_token = opt_str_arg(eos_token, "eos token")?.map(String::from);
        ChatTemplate::new(template, bos_token, eos_token).map(into_handle)
    })
}

/// Renders a JSON array of messages. Tools are passed only when both
/// `tools_json` and `tool_prompt` are given and `tools_json` is not empty.
/// Release the result with [`tokenizers_free_string`].
///
/// # Safety
///
/// `ptr` is a live chat template and `messages_json` a NUL-terminated
/// string. `tools_json` and `tool_prompt` are null or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_apply_chat_template(
    ptr: *mut c_void,
    messages_json: *const c_char,
    tools_json: *const c_char,
    tool_prompt: *const c_char,
    error: *mut *mut c_char,
) -> *mut c_char {
    call(error, null_mut(), || {
        let template = chat_template(ptr)?;
        let messages = serde_json::from_str::<Vec<Message>>(str_arg(messages_json, "messages")?)
            .map_err(|e| Error::InvalidArgument(format!("messages: {e}")))?;
        let tools = match (
            opt_str_arg(tools_json, "tools")?,
            opt_str_arg(tool_prompt, "tool prompt")?,
        ) {
            (Some(json), Some(prompt)) if !json.is_empty() => {
                let tools = serde_json::from_str::<Vec<serde_json::Value>>(json)
                    .map_err(|e| Error::InvalidArgument(format!("tools: {e}")))?;
                Some((tools, prompt))
            }
            _ => None,
        };
        let tools = tools.as_ref().map(|(tools, prompt)| (tools.as_slice(), *prompt));
        into_c_string(template.apply(&messages, tools)?)
    })
}

/// # Safety
///
/// `ptr` is null or a chat template that no other call is using.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_free_chat_template(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr.cast::<ChatTemplate>()));
    }
}

/// Releases every array of a buffer from [`tokenizers_encode`]. Null arrays
/// are skipped.
///
/// # Safety
///
/// `buffer` is unchanged from what this library returned and has not been
/// released before.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_free_buffer(buffer: tokenizers_buffer) {
    buffer.release()
}

/// Releases every buffer of a batch, then the batch.
///
/// # Safety
///
/// As [`tokenizers_free_buffer`]. Buffers inside a batch must not be
/// released on their own.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_free_batch_buffer(batch: tokenizers_batch_buffer) {
    batch.release()
}

/// # Safety
///
/// `ptr` is null or a string returned by this library, not freed before.
/// [`tokenizers_version`] is not such a string.
#[no_mangle]
pub unsafe extern "C" fn tokenizers_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
