//! Derive macro for shapr type descriptors.
//!
//! `#[derive(Shape)]` generates three impls for a struct with named fields:
//!
//! - `shapr_abi::Shape`, defining a record `TypeDef` in the registry
//! - `From<T> for shapr_abi::Value`
//! - `TryFrom<shapr_abi::Value> for T`
//!
//! An enum whose variants are all units is described as a string leaf (or a
//! custom kind) holding the variant name.
//!
//! # Example
//!
//! ```ignore
//! use shapr_abi::{Shape, Value};
//!
//! #[derive(Shape)]
//! #[shape(name = "Customer")]
//! struct Person {
//!     #[shape(size = 20)]
//!     name: String,
//!     #[shape(rename = "years", align = "left")]
//!     age: i64,
//!     #[shape(max_occurs = 3)]
//!     phones: Vec<Phone>,
//!     #[shape(kind = "date")]
//!     born: String,
//!     #[shape(skip)]
//!     cache: Option<u64>,
//!     gender: Gender,
//! }
//!
//! #[derive(Shape)]
//! enum Gender {
//!     #[shape(rename = "F")]
//!     Female,
//!     #[shape(rename = "M")]
//!     Male,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Attribute, Data, DataEnum, DeriveInput, Fields, FieldsNamed, Ident, LitInt,
    LitStr,
};

/// Derive `Shape` and the `Value` conversions for a struct or a unit enum.
///
/// # Container attributes
///
/// - `#[shape(name = "...")]` - type name used in the registry (default: the struct name)
/// - `#[shape(kind = "...")]` - enums only: describe as a custom leaf kind instead of `string`
///
/// # Field attributes
///
/// - `#[shape(rename = "...")]` - member name
/// - `#[shape(skip)]` - keep the field out of the metadata; restored with `Default`
/// - `#[shape(default)]` - restore the field with `Default` when it is absent from a value
/// - `#[shape(size = N)]` - fixed slot width
/// - `#[shape(max_occurs = N)]` - fixed number of occurrences for a list
/// - `#[shape(align = "left" | "right")]` - alignment inside the slot
/// - `#[shape(kind = "...")]` - custom leaf kind for the field's item type
///
/// # Variant attributes
///
/// - `#[shape(rename = "...")]` - text written for the variant
#[proc_macro_derive(Shape, attributes(shape))]
pub fn derive_shape(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Shape cannot be derived for generic types",
        ));
    }

    let container = container_attrs(&input.attrs)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Shape can only be derived for structs with named fields",
                ))
            }
        },
        Data::Enum(data) => return expand_enum(&input.ident, &container, data),
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Shape cannot be derived for unions",
            ))
        }
    };

    if container.kind.is_some() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "`kind` on a struct is not supported; put it on a field",
        ));
    }

    let type_name = container.name.unwrap_or_else(|| input.ident.to_string());
    let members = collect_members(fields)?;

    let shape = derive_shape_impl(&input.ident, &type_name, &members);
    let from = derive_from(&input.ident, &members);
    let try_from = derive_try_from(&input.ident, &members);

    Ok(quote! {
        #shape
        #from
        #try_from
    })
}

// ============================================================================
// Attributes
// ============================================================================

enum AlignAttr {
    Left,
    Right,
}

#[derive(Default)]
struct ContainerAttrs {
    name: Option<String>,
    kind: Option<String>,
}

#[derive(Default)]
struct MemberAttrs {
    rename: Option<String>,
    skip: bool,
    default: bool,
    size: Option<u32>,
    max_occurs: Option<u32>,
    align: Option<AlignAttr>,
    kind: Option<String>,
}

struct Member<'a> {
    ident: &'a Ident,
    ty: &'a syn::Type,
    name: String,
    attrs: MemberAttrs,
}

fn container_attrs(attrs: &[Attribute]) -> syn::Result<ContainerAttrs> {
    let mut out = ContainerAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("shape") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new_spanned(&lit, "type name cannot be empty"));
                }
                out.name = Some(lit.value());
                Ok(())
            } else if meta.path.is_ident("kind") {
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new_spanned(&lit, "kind name cannot be empty"));
                }
                out.kind = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported shape container attribute"))
            }
        })?;
    }
    Ok(out)
}

fn member_attrs(attrs: &[Attribute]) -> syn::Result<MemberAttrs> {
    let mut out = MemberAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("shape") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                out.rename = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("skip") {
                out.skip = true;
            } else if meta.path.is_ident("default") {
                out.default = true;
            } else if meta.path.is_ident("size") {
                out.size = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("max_occurs") {
                out.max_occurs = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("align") {
                let lit: LitStr = meta.value()?.parse()?;
                out.align = Some(match lit.value().as_str() {
                    "left" => AlignAttr::Left,
                    "right" => AlignAttr::Right,
                    _ => {
                        return Err(syn::Error::new_spanned(
                            &lit,
                            "expected \"left\" or \"right\"",
                        ))
                    }
                });
            } else if meta.path.is_ident("kind") {
                out.kind = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unsupported shape field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn collect_members(fields: &FieldsNamed) -> syn::Result<Vec<Member<'_>>> {
    fields
        .named
        .iter()
        .map(|field| {
            let ident = field
                .ident
                .as_ref()
                .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
            let attrs = member_attrs(&field.attrs)?;
            let name = attrs
                .rename
                .clone()
                .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
            Ok(Member {
                ident,
                ty: &field.ty,
                name,
                attrs,
            })
        })
        .collect()
}

// ============================================================================
// Shape
// ============================================================================

fn optional_u32(value: Option<u32>) -> TokenStream2 {
    match value {
        Some(n) => quote!(shapr_abi::__private::Some(#n)),
        None => quote!(shapr_abi::__private::None),
    }
}

fn derive_shape_impl(ident: &Ident, type_name: &str, members: &[Member<'_>]) -> TokenStream2 {
    let field_defs: Vec<_> = members
        .iter()
        .map(|member| {
            let name = &member.name;
            let ty = member.ty;
            let skip = member.attrs.skip;

            // Skipped fields need not implement Shape.
            let describe = if skip {
                quote!(shapr_abi::Type::Value)
            } else {
                match &member.attrs.kind {
                    Some(kind) => quote! {
                        <#ty as shapr_abi::Shape>::describe(registry)
                            .with_innermost(shapr_abi::Type::custom(#kind))
                    },
                    None => quote!(<#ty as shapr_abi::Shape>::describe(registry)),
                }
            };

            let size = optional_u32(member.attrs.size);
            let max_occurs = optional_u32(member.attrs.max_occurs);
            let align = match member.attrs.align {
                Some(AlignAttr::Left) => quote!(shapr_abi::__private::Some(shapr_abi::Align::Left)),
                Some(AlignAttr::Right) => {
                    quote!(shapr_abi::__private::Some(shapr_abi::Align::Right))
                }
                None => quote!(shapr_abi::__private::None),
            };

            quote! {
                shapr_abi::Field {
                    name: shapr_abi::__private::String::from(#name),
                    ty: #describe,
                    format: shapr_abi::Format {
                        size: #size,
                        max_occurs: #max_occurs,
                        align: #align,
                    },
                    skip: #skip,
                }
            }
        })
        .collect();

    quote! {
        impl shapr_abi::Shape for #ident {
            fn describe(registry: &mut shapr_abi::TypeRegistry) -> shapr_abi::Type {
                let owner = shapr_abi::__private::TypeId::of::<Self>();
                if registry.claim(#type_name, owner) {
                    // Placeholder first, so recursive references terminate.
                    registry.define(shapr_abi::TypeDef::record(
                        #type_name,
                        shapr_abi::__private::Vec::new(),
                    ));
                    let fields = shapr_abi::__private::vec![#(#field_defs),*];
                    registry.define(shapr_abi::TypeDef::record(#type_name, fields));
                }
                shapr_abi::Type::named(#type_name)
            }
        }
    }
}

// ============================================================================
// Value conversions
// ============================================================================

fn derive_from(ident: &Ident, members: &[Member<'_>]) -> TokenStream2 {
    let entries: Vec<_> = members
        .iter()
        .filter(|member| !member.attrs.skip)
        .map(|member| {
            let field = member.ident;
            let name = &member.name;
            quote! {
                (
                    shapr_abi::__private::String::from(#name),
                    shapr_abi::Value::from(value.#field)
                )
            }
        })
        .collect();

    quote! {
        impl shapr_abi::__private::From<#ident> for shapr_abi::Value {
            #[allow(unused_variables)]
            fn from(value: #ident) -> shapr_abi::Value {
                shapr_abi::Value::Record(shapr_abi::__private::vec![#(#entries),*])
            }
        }
    }
}

fn derive_try_from(ident: &Ident, members: &[Member<'_>]) -> TokenStream2 {
    let kept: Vec<&Member<'_>> = members.iter().filter(|m| !m.attrs.skip).collect();
    let slots: Vec<Ident> = (0..kept.len())
        .map(|i| format_ident!("__shape_slot_{}", i))
        .collect();
    let names: Vec<&String> = kept.iter().map(|m| &m.name).collect();

    let assignments: Vec<_> = kept
        .iter()
        .zip(&slots)
        .map(|(member, slot)| {
            let field = member.ident;
            let ty = member.ty;
            let name = &member.name;
            let absent = if member.attrs.default {
                quote!(shapr_abi::__private::Default::default())
            } else {
                quote! {
                    return shapr_abi::__private::Err(shapr_abi::ConversionError::MissingField(
                        shapr_abi::__private::String::from(#name)
                    ))
                }
            };
            quote! {
                #field: match #slot {
                    shapr_abi::__private::Some(field_value) => {
                        <#ty as shapr_abi::FromValue>::from_value(field_value)
                            .map_err(|e| shapr_abi::ConversionError::FieldError(
                                shapr_abi::__private::String::from(#name),
                                shapr_abi::__private::Box::new(e)
                            ))?
                    }
                    shapr_abi::__private::None => #absent,
                }
            }
        })
        .collect();

    let defaults: Vec<_> = members
        .iter()
        .filter(|member| member.attrs.skip)
        .map(|member| {
            let field = member.ident;
            quote!(#field: shapr_abi::__private::Default::default())
        })
        .collect();

    quote! {
        impl shapr_abi::__private::TryFrom<shapr_abi::Value> for #ident {
            type Error = shapr_abi::ConversionError;

            fn try_from(value: shapr_abi::Value) -> shapr_abi::__private::Result<Self, Self::Error> {
                let fields = match value {
                    shapr_abi::Value::Record(fields) => fields,
                    other => {
                        return shapr_abi::__private::Err(shapr_abi::ConversionError::ExpectedRecord(
                            shapr_abi::__private::format!("{:?}", other)
                        ))
                    }
                };

                #(
                    let mut #slots: shapr_abi::__private::Option<shapr_abi::Value> =
                        shapr_abi::__private::None;
                )*
                for (name, field_value) in fields {
                    match name.as_str() {
                        #( #names => #slots = shapr_abi::__private::Some(field_value), )*
                        _ => {
                            return shapr_abi::__private::Err(
                                shapr_abi::ConversionError::UnknownField(name)
                            )
                        }
                    }
                }

                shapr_abi::__private::Ok(Self {
                    #(#assignments,)*
                    #(#defaults,)*
                })
            }
        }
    }
}

// ============================================================================
// Unit enums
// ============================================================================

fn variant_name(attrs: &[Attribute], ident: &Ident) -> syn::Result<String> {
    let mut name = None;
    for attr in attrs {
        if !attr.path().is_ident("shape") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                if lit.value().is_empty() {
                    return Err(syn::Error::new_spanned(&lit, "variant name cannot be empty"));
                }
                name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported shape variant attribute"))
            }
        })?;
    }
    Ok(name.unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string()))
}

fn expand_enum(
    ident: &Ident,
    container: &ContainerAttrs,
    data: &DataEnum,
) -> syn::Result<TokenStream2> {
    if container.name.is_some() {
        return Err(syn::Error::new_spanned(
            ident,
            "`name` is not supported on enums; an enum is a leaf, not a named type",
        ));
    }
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(
            ident,
            "Shape cannot be derived for an enum without variants",
        ));
    }

    let mut variants: Vec<(&Ident, String)> = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "Shape can only be derived for enums whose variants are all units",
            ));
        }
        let name = variant_name(&variant.attrs, &variant.ident)?;
        if variants.iter().any(|(_, taken)| *taken == name) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("variant name `{name}` is used twice"),
            ));
        }
        variants.push((&variant.ident, name));
    }

    let describe = match &container.kind {
        Some(kind) => quote!(shapr_abi::Type::custom(#kind)),
        None => quote!(shapr_abi::Type::String),
    };
    let idents: Vec<&Ident> = variants.iter().map(|(ident, _)| *ident).collect();
    let names: Vec<&String> = variants.iter().map(|(_, name)| name).collect();

    Ok(quote! {
        impl shapr_abi::Shape for #ident {
            fn describe(_registry: &mut shapr_abi::TypeRegistry) -> shapr_abi::Type {
                #describe
            }
        }

        impl shapr_abi::__private::From<#ident> for shapr_abi::Value {
            fn from(value: #ident) -> shapr_abi::Value {
                let name = match value {
                    #( #ident::#idents => #names, )*
                };
                shapr_abi::Value::String(shapr_abi::__private::String::from(name))
            }
        }

        impl shapr_abi::__private::TryFrom<shapr_abi::Value> for #ident {
            type Error = shapr_abi::ConversionError;

            fn try_from(value: shapr_abi::Value) -> shapr_abi::__private::Result<Self, Self::Error> {
                match value {
                    shapr_abi::Value::String(name) => match name.as_str() {
                        #( #names => shapr_abi::__private::Ok(#ident::#idents), )*
                        _ => shapr_abi::__private::Err(
                            shapr_abi::ConversionError::UnknownVariant(name)
                        ),
                    },
                    other => shapr_abi::__private::Err(shapr_abi::ConversionError::TypeMismatch {
                        expected: shapr_abi::__private::String::from("string"),
                        got: shapr_abi::__private::format!("{:?}", other),
                    }),
                }
            }
        }
    })
}
