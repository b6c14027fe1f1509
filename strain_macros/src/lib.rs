use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{ItemFn, parse_macro_input};

extern crate proc_macro;

/// Turns `async fn name() -> Outcome` into `fn name() -> Arc<dyn Executable>`
/// returning a `TestCase` called `name`.
#[proc_macro_attribute]
pub fn test_case(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemFn);
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = ast;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(&sig.fn_token, "test_case bodies must be async")
            .to_compile_error()
            .into();
    }
    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "test_case bodies take no arguments")
            .to_compile_error()
            .into();
    }

    let name = &sig.ident;
    let label = name.to_string();
    let mut body_sig = sig.clone();
    body_sig.ident = format_ident!("__{}_body", name);
    let body = &body_sig.ident;

    let expanded = quote! {
        #(#attrs)*
        #vis fn #name() -> ::std::sync::Arc<dyn ::strain::Executable> {
            #body_sig #block

            ::strain::TestCase::shared(#label, #body)
        }
    };

    TokenStream::from(expanded)
}
