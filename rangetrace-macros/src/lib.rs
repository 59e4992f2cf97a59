extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{DeriveInput, Ident, parse_macro_input};

mod syscall_table;

use syscall_table::generate_syscall_enum;

/// Generate a syscall enum from an architecture's syscall table
///
/// The attribute argument names the architecture (`x86_64` or `aarch64`).
/// The table is taken from the kernel definitions shipped with the
/// `syscalls` crate, so the output does not depend on the build host.
///
/// # Example
///
/// ```ignore
/// #[rangetrace_macros::syscall_enum(x86_64)]
/// pub enum Syscall {}
/// ```
#[proc_macro_attribute]
pub fn syscall_enum(attr: TokenStream, item: TokenStream) -> TokenStream {
	let arch = parse_macro_input!(attr as Ident);
	let input = parse_macro_input!(item as DeriveInput);

	match generate_syscall_enum(&arch, &input) {
		Ok(enum_output) => enum_output.into(),
		Err(err) => syn::Error::new(arch.span(), err).to_compile_error().into(),
	}
}
