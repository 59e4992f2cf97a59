//! Syscall table generation
//!
//! This module turns an architecture's syscall table into an enum with
//! one variant per syscall, plus number/name conversions.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use std::collections::BTreeMap;
use syn::{DeriveInput, Ident};

/// Highest syscall number probed on any supported architecture
const MAX_SYSCALL_NUMBER: usize = 1024;

/// Generate the syscall enum for `arch`
pub fn generate_syscall_enum(arch: &Ident, input: &DeriveInput) -> Result<TokenStream, String> {
	let name = &input.ident;
	let vis = &input.vis;
	let attrs = &input.attrs;

	let syscall_table = generate_syscall_table(&arch.to_string())?;

	let variants = syscall_table.iter().map(|(syscall_num, syscall_name)| {
		let variant_name = format_ident!("{}", syscall_name);
		let doc = format!("System call #{syscall_num} - `{syscall_name}`");
		quote! {
			#[doc = #doc]
			#variant_name = #syscall_num as isize
		}
	});

	let match_arms = syscall_table.iter().map(|(syscall_num, syscall_name)| {
		let variant_name = format_ident!("{}", syscall_name);
		quote! {
			#syscall_num => Some(Self::#variant_name)
		}
	});

	let name_match_arms = syscall_table.iter().map(|(_syscall_num, syscall_name)| {
		let variant_name = format_ident!("{}", syscall_name);
		quote! {
			Self::#variant_name => #syscall_name
		}
	});

	let count = syscall_table.len();

	let output = quote! {
		#(#attrs)*
		#[allow(non_camel_case_types)]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		#vis enum #name {
			#(#variants),*
		}

		impl #name {
			/// Number of syscalls known for this architecture
			pub const COUNT: usize = #count;

			/// Convert a syscall number to a variant
			#[must_use]
			pub const fn from_number(num: i64) -> Option<Self> {
				match num {
					#(#match_arms,)*
					_ => None,
				}
			}

			/// Get the name of the syscall
			#[must_use]
			pub const fn name(&self) -> &'static str {
				match self {
					#(#name_match_arms),*
				}
			}

			/// Get the number of the syscall
			#[must_use]
			pub const fn number(&self) -> i64 {
				*self as i64
			}
		}
	};

	Ok(output)
}

/// Map of syscall numbers to normalized names for one architecture
fn generate_syscall_table(arch: &str) -> Result<BTreeMap<i64, String>, String> {
	let lookup: fn(usize) -> Option<&'static str> = match arch {
		"x86_64" => x86_64_name,
		"aarch64" => aarch64_name,
		other => return Err(format!("unsupported architecture `{other}`, expected x86_64 or aarch64")),
	};

	let table: BTreeMap<i64, String> = (0..MAX_SYSCALL_NUMBER)
		.filter_map(|id| lookup(id).map(|name| (id as i64, normalize_syscall_name(name))))
		.collect();

	if table.is_empty() {
		return Err(format!("no syscalls found for `{arch}`"));
	}
	Ok(table)
}

fn x86_64_name(id: usize) -> Option<&'static str> {
	syscalls::x86_64::Sysno::new(id).map(|sysno| sysno.name())
}

fn aarch64_name(id: usize) -> Option<&'static str> {
	syscalls::aarch64::Sysno::new(id).map(|sysno| sysno.name())
}

/// Normalize syscall names to valid Rust identifiers
fn normalize_syscall_name(name: &str) -> String {
	let name = name
		.chars()
		.map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
		.collect::<String>();

	// Ensure name starts with a letter or underscore
	if name
		.chars()
		.next()
		.map(|c| c.is_alphabetic() || c == '_')
		.unwrap_or(false)
	{
		name
	} else {
		format!("_{}", name)
	}
}
