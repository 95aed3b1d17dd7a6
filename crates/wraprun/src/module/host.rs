//! # Host-call table
//!
//! Everything a binary module may import, all under the `wrap` namespace.
//! Buffers are always allocated by the guest: the host announces a length, the
//! guest hands back a pointer and the host copies into it.
//!
//! Host functions fail by trapping. A trap ends the invocation and is reported by
//! the wrapper as `ExecutionAborted`.

use anyhow::Context;
use anyhow::anyhow;
use anyhow::bail;
use tracing::debug;
use tracing::warn;
use wasmtime::Caller;
use wasmtime::Extern;
use wasmtime::Linker;
use wasmtime::Memory;
use wrapcore::Uri;
use wrapcore::codec;

use crate::client::InvokeOptions;
use crate::module::context::Abort;
use crate::module::context::ModuleCtx;
use crate::module::context::Subinvoke;

pub const NAMESPACE: &str = "wrap";

/// Installs every `wrap` import into `linker`.
pub fn link(linker: &mut Linker<ModuleCtx>) -> wasmtime::Result<()> {
    linker.func_wrap(
        NAMESPACE,
        "__wrap_invoke_args",
        |mut caller: Caller<'_, ModuleCtx>, method_ptr: u32, args_ptr: u32| -> anyhow::Result<()> {
            let method = caller.data().method.clone();
            let args = caller.data().args.clone();
            write(&mut caller, method_ptr, &method)?;
            write(&mut caller, args_ptr, &args)
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_invoke_result",
        |mut caller: Caller<'_, ModuleCtx>, ptr: u32, len: u32| -> anyhow::Result<()> {
            let bytes = read(&mut caller, ptr, len)?;
            caller.data_mut().result = Some(bytes);
            Ok(())
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_invoke_error",
        |mut caller: Caller<'_, ModuleCtx>, ptr: u32, len: u32| -> anyhow::Result<()> {
            let message = read_string(&mut caller, ptr, len)?;
            caller.data_mut().error = Some(message);
            Ok(())
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_load_env",
        |mut caller: Caller<'_, ModuleCtx>, ptr: u32| -> anyhow::Result<()> {
            let env = caller.data().env.clone();
            write(&mut caller, ptr, &env)
        },
    )?;

    linker.func_wrap_async(
        NAMESPACE,
        "__wrap_subinvoke",
        |mut caller: Caller<'_, ModuleCtx>,
         (uri_ptr, uri_len, method_ptr, method_len, args_ptr, args_len): (u32, u32, u32, u32, u32, u32)| {
            Box::new(async move {
                let ctx = caller.data_mut();
                ctx.subinvoke = Subinvoke::Idle;
                ctx.last_failure = None;

                let uri = read_string(&mut caller, uri_ptr, uri_len)?;
                let method = read_string(&mut caller, method_ptr, method_len)?;
                let args = read(&mut caller, args_ptr, args_len)?;

                let uri = match Uri::parse(&uri) {
                    Ok(uri) => uri,
                    Err(e) => {
                        caller.data_mut().subinvoke = Subinvoke::Failed(e.to_string());
                        return Ok(0u32);
                    }
                };

                debug!(%uri, %method, "subinvoke");
                let invoker = caller.data().invoker.clone();
                let outcome = invoker
                    .invoke_raw(InvokeOptions::new(uri, method).raw_args(args))
                    .await;

                let ctx = caller.data_mut();
                match outcome {
                    Ok(bytes) => {
                        ctx.subinvoke = Subinvoke::Succeeded(bytes);
                        Ok(1u32)
                    }
                    Err(e) => {
                        ctx.subinvoke = Subinvoke::Failed(e.to_string());
                        ctx.last_failure = Some(e);
                        Ok(0u32)
                    }
                }
            })
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_subinvoke_result_len",
        |caller: Caller<'_, ModuleCtx>| -> anyhow::Result<u32> {
            match &caller.data().subinvoke {
                Subinvoke::Succeeded(bytes) => Ok(bytes.len() as u32),
                _ => bail!("no sub-invocation result to read"),
            }
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_subinvoke_result",
        |mut caller: Caller<'_, ModuleCtx>, ptr: u32| -> anyhow::Result<()> {
            let bytes = match &caller.data().subinvoke {
                Subinvoke::Succeeded(bytes) => bytes.clone(),
                _ => bail!("no sub-invocation result to read"),
            };
            write(&mut caller, ptr, &bytes)
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_subinvoke_error_len",
        |caller: Caller<'_, ModuleCtx>| -> anyhow::Result<u32> {
            match &caller.data().subinvoke {
                Subinvoke::Failed(message) => Ok(message.len() as u32),
                _ => bail!("no sub-invocation error to read"),
            }
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_subinvoke_error",
        |mut caller: Caller<'_, ModuleCtx>, ptr: u32| -> anyhow::Result<()> {
            let message = match &caller.data().subinvoke {
                Subinvoke::Failed(message) => message.clone(),
                _ => bail!("no sub-invocation error to read"),
            };
            write(&mut caller, ptr, message.as_bytes())
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_get_implementations",
        |mut caller: Caller<'_, ModuleCtx>, uri_ptr: u32, uri_len: u32| -> anyhow::Result<u32> {
            let raw = read_string(&mut caller, uri_ptr, uri_len)?;
            let Ok(interface) = Uri::parse(&raw) else {
                caller.data_mut().implementations = None;
                return Ok(0);
            };

            let found: Vec<String> = caller
                .data()
                .invoker
                .get_implementations(&interface)
                .iter()
                .map(ToString::to_string)
                .collect();
            caller.data_mut().implementations = Some(codec::encode(&found)?);
            Ok(1)
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_get_implementations_result_len",
        |caller: Caller<'_, ModuleCtx>| -> anyhow::Result<u32> {
            let bytes = caller
                .data()
                .implementations
                .as_ref()
                .ok_or_else(|| anyhow!("no implementations result to read"))?;
            Ok(bytes.len() as u32)
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_get_implementations_result",
        |mut caller: Caller<'_, ModuleCtx>, ptr: u32| -> anyhow::Result<()> {
            let bytes = caller
                .data()
                .implementations
                .clone()
                .ok_or_else(|| anyhow!("no implementations result to read"))?;
            write(&mut caller, ptr, &bytes)
        },
    )?;

    linker.func_wrap(
        NAMESPACE,
        "__wrap_abort",
        |mut caller: Caller<'_, ModuleCtx>,
         msg_ptr: u32,
         msg_len: u32,
         file_ptr: u32,
         file_len: u32,
         line: u32,
         column: u32|
         -> anyhow::Result<()> {
            let message = read_string(&mut caller, msg_ptr, msg_len)?;
            let file = read_string(&mut caller, file_ptr, file_len)?;
            let abort = Abort { message, file, line, column };
            warn!(%abort, "module aborted");
            let trap = anyhow!("module aborted: {abort}");
            caller.data_mut().abort = Some(abort);
            Err(trap)
        },
    )?;

    Ok(())
}

fn memory(caller: &mut Caller<'_, ModuleCtx>) -> anyhow::Result<Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => Ok(memory),
        _ => bail!("module does not export its memory"),
    }
}

fn read(caller: &mut Caller<'_, ModuleCtx>, ptr: u32, len: u32) -> anyhow::Result<Vec<u8>> {
    let memory = memory(caller)?;
    let start = ptr as usize;
    let bytes = start
        .checked_add(len as usize)
        .and_then(|end| memory.data(&*caller).get(start..end))
        .ok_or_else(|| anyhow!("guest read out of bounds at {ptr}+{len}"))?;
    Ok(bytes.to_vec())
}

fn read_string(caller: &mut Caller<'_, ModuleCtx>, ptr: u32, len: u32) -> anyhow::Result<String> {
    let bytes = read(caller, ptr, len)?;
    String::from_utf8(bytes).context("guest string is not utf-8")
}

fn write(caller: &mut Caller<'_, ModuleCtx>, ptr: u32, bytes: &[u8]) -> anyhow::Result<()> {
    let memory = memory(caller)?;
    memory
        .write(&mut *caller, ptr as usize, bytes)
        .with_context(|| format!("guest write out of bounds at {ptr}+{}", bytes.len()))
}
