#![deny(missing_docs)]

//! Entry point attribute for the invocation shim runtime.
//!
//! An asynchronous `main` annotated with `#[lambda]` must accept an event of a type
//! implementing `serde::Deserialize` and a `shim_runtime::Context`, and return a
//! `Result<B, E>` where `B` implements `serde::Serialize` and `E` implements
//! `Display`. The attribute turns it into a `main` that serves invocations with it:
//!
//! ```ignore
//! use shim_runtime::{lambda, Context, Error};
//! use serde_json::Value;
//!
//! #[lambda]
//! #[tokio::main]
//! async fn main(event: Value, _: Context) -> Result<Value, Error> {
//!     Ok(event)
//! }
//! ```

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote_spanned;
use syn::{spanned::Spanned, FnArg, ItemFn, PatType};

#[proc_macro_attribute]
/// Wrap an async function into the runtime's invocation loop
pub fn lambda(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(item as ItemFn);
    if !attr.is_empty() {
        let attr = proc_macro2::TokenStream::from(attr);
        let tokens = quote_spanned! { attr.span() =>
            compile_error!("#[lambda] does not take arguments");
        };
        return TokenStream::from(tokens);
    }

    let ret = &input.sig.output;
    let name = &input.sig.ident;
    let body = &input.block;
    let attrs = &input.attrs;
    let asyncness = &input.sig.asyncness;
    let inputs = &input.sig.inputs;

    if name != "main" {
        let tokens = quote_spanned! { name.span() =>
            compile_error!("only the main function can be tagged with #[lambda]");
        };
        return TokenStream::from(tokens);
    }

    if asyncness.is_none() {
        let tokens = quote_spanned! { input.span() =>
          compile_error!("the async keyword is missing from the function declaration");
        };
        return TokenStream::from(tokens);
    }

    if inputs.len() != 2 {
        let tokens = quote_spanned! { inputs.span() =>
            compile_error!("The #[lambda] macro expects two arguments: a triggered event and the invocation context.");
        };
        return TokenStream::from(tokens);
    }

    let event = match typed_argument(inputs.iter().next()) {
        Some(arg) => arg,
        None => {
            let tokens = quote_spanned! { inputs.span() =>
                compile_error!("fn main's first argument must be fully formed");
            };
            return TokenStream::from(tokens);
        }
    };
    let context = match typed_argument(inputs.iter().nth(1)) {
        Some(arg) => arg,
        None => {
            let tokens = quote_spanned! { inputs.span() =>
                compile_error!("fn main's second argument must be fully formed");
            };
            return TokenStream::from(tokens);
        }
    };

    let event_name = &event.pat;
    let event_type = &event.ty;
    let context_name = &context.pat;
    let context_type = &context.ty;

    let result = quote_spanned! { input.span() =>

        #(#attrs)*
        #asyncness fn main() -> ::std::result::Result<(), shim_runtime::Error> {
            async fn actual(#event_name: #event_type, #context_name: #context_type) #ret #body

            let f = shim_runtime::handler_fn(actual);
            shim_runtime::run(f).await
        }
    };

    result.into()
}

fn typed_argument(arg: Option<&FnArg>) -> Option<&PatType> {
    match arg {
        Some(FnArg::Typed(arg)) => Some(arg),
        _ => None,
    }
}
