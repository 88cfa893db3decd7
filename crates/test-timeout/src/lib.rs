//! Test attributes that fail a test once it runs longer than a fixed budget.
//!
//! `#[test_timeout::timeout]` wraps a synchronous test and
//! `#[test_timeout::tokio_timeout_test]` an async one (current-thread runtime).
//! Both accept an optional budget in seconds, e.g. `#[test_timeout::timeout(5)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let function = parse_macro_input!(item as ItemFn);
    expand(attr, function, Flavor::Blocking).unwrap_or_else(|err| err.to_compile_error().into())
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let function = parse_macro_input!(item as ItemFn);
    expand(attr, function, Flavor::Tokio).unwrap_or_else(|err| err.to_compile_error().into())
}

#[derive(Clone, Copy)]
enum Flavor {
    Blocking,
    Tokio,
}

fn expand(attr: TokenStream, function: ItemFn, flavor: Flavor) -> syn::Result<TokenStream> {
    let secs = timeout_secs(attr)?;
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = function;

    let body = match flavor {
        Flavor::Blocking => {
            if sig.asyncness.is_some() {
                return Err(syn::Error::new_spanned(
                    &sig.ident,
                    "use tokio_timeout_test for async test functions",
                ));
            }
            quote! { #block }
        }
        Flavor::Tokio => {
            if sig.asyncness.take().is_none() {
                return Err(syn::Error::new_spanned(
                    &sig.ident,
                    "tokio_timeout_test expects an async function",
                ));
            }
            quote! {{
                let runtime = ::tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build tokio runtime");
                runtime.block_on(async move {
                    if ::tokio::time::timeout(__budget, async move #block).await.is_err() {
                        panic!("test exceeded {:?}", __budget);
                    }
                })
            }}
        }
    };

    let attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_marker(attr))
        .collect();
    let name = sig.ident.to_string();
    let guarded = run_with_budget(secs, &name, body);

    Ok(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #guarded
        }
    }
    .into())
}

/// Runs `body` on a fresh thread and waits at most `secs` for it, forwarding
/// any panic to the test harness.
fn run_with_budget(secs: u64, name: &str, body: TokenStream2) -> TokenStream2 {
    quote! {
        let __budget = ::std::time::Duration::from_secs(#secs);
        let (__done, __outcome) = ::std::sync::mpsc::channel();
        ::std::thread::Builder::new()
            .name(::std::format!("{}-guarded", #name))
            .spawn(move || {
                let result = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| #body));
                let _ = __done.send(result);
            })
            .expect("failed to spawn test thread");
        match __outcome.recv_timeout(__budget) {
            Ok(Ok(_)) => {}
            Ok(Err(payload)) => ::std::panic::resume_unwind(payload),
            Err(::std::sync::mpsc::RecvTimeoutError::Timeout) => {
                panic!("{} timed out after {:?}", #name, __budget)
            }
            Err(::std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                panic!("{} exited without reporting a result", #name)
            }
        }
    }
}

fn timeout_secs(attr: TokenStream) -> syn::Result<u64> {
    if attr.is_empty() {
        return Ok(DEFAULT_TIMEOUT_SECS);
    }
    let lit: LitInt = syn::parse(attr)?;
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new_spanned(lit, "timeout must be at least one second"));
    }
    Ok(secs)
}

// `#[test]` and `#[tokio::test]` are replaced by the generated `#[test]`.
fn is_test_marker(attr: &Attribute) -> bool {
    let segments: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(
        segments.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["test"] | ["tokio", "test"]
    )
}
