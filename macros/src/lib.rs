//! Proc macros for the iteration-runner.
//!
//! This crate provides the `#[benchmark]` attribute macro for compiling
//! benchmark entry points into a runner binary, and `runner_main!()` for
//! generating that binary's `main`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Register a function as a benchmark entry point.
///
/// The function must have the signature `fn(i32)`; it is the benchmark's
/// `run_iter` and receives the run's parameter on every iteration.
///
/// # Example
///
/// ```rust,ignore
/// use iteration_runner::benchmark;
///
/// #[benchmark]
/// fn spin(n: i32) {
///     for i in 0..n {
///         std::hint::black_box(i);
///     }
/// }
/// ```
///
/// # Attributes
///
/// - `#[benchmark]` - Registered under the function name
/// - `#[benchmark(name = "custom_name")]` - Use a custom name instead of function name
#[proc_macro_attribute]
pub fn benchmark(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let fn_name = &input.sig.ident;
    let fn_name_str = fn_name.to_string();

    if input.sig.inputs.len() != 1 {
        return syn::Error::new_spanned(
            &input.sig,
            "#[benchmark] functions take exactly one `i32` parameter",
        )
        .to_compile_error()
        .into();
    }

    let custom_name = parse_custom_name(&attr.to_string()).unwrap_or_else(|| fn_name_str.clone());

    let submit_ident = syn::Ident::new(
        &format!("__ITERATION_RUNNER_BENCH_{}", fn_name_str.to_uppercase()),
        fn_name.span(),
    );

    let expanded = quote! {
        #input

        #[allow(non_upper_case_globals)]
        #[::iteration_runner::__private::linkme::distributed_slice(::iteration_runner::__private::BENCHMARKS)]
        #[linkme(crate = ::iteration_runner::__private::linkme)]
        static #submit_ident: ::iteration_runner::__private::BenchmarkEntry = ::iteration_runner::__private::BenchmarkEntry {
            name: #custom_name,
            func: #fn_name,
            module_path: module_path!(),
        };
    };

    TokenStream::from(expanded)
}

fn parse_custom_name(attr: &str) -> Option<String> {
    // name = "value"
    let rest = &attr[attr.find("name")?..];
    let after_eq = &rest[rest.find('=')? + 1..];
    let after_quote = &after_eq[after_eq.find('"')? + 1..];
    let end = after_quote.find('"')?;
    Some(after_quote[..end].to_string())
}

/// Generate the `main` function of a runner binary.
///
/// The binary accepts the standard runner arguments and can run any
/// benchmark registered with `#[benchmark]` in the crates it links, as well
/// as shared-library benchmarks.
///
/// # Example
///
/// ```rust,ignore
/// use iteration_runner::{benchmark, runner_main};
///
/// #[benchmark]
/// fn noop(_n: i32) {}
///
/// runner_main!();
/// ```
#[proc_macro]
pub fn runner_main(_input: TokenStream) -> TokenStream {
    let expanded = quote! {
        fn main() -> ::std::process::ExitCode {
            ::iteration_runner::cli::run_cli()
        }
    };
    TokenStream::from(expanded)
}
