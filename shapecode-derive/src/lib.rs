//! # Shapecode Derive Macros
//!
//! This crate provides the procedural macros for `shapecode`:
//!
//! - `#[shape]` on an inherent `impl` block implements `Shaped` for a record type. Every
//!   constructor candidate (an associated function returning `Self`) and every `&self` method is
//!   lowered into the `shapecode::ir` instruction list and recorded in a static `ClassInfo`
//!   table, together with type-erased invokers.
//! - `#[derive(ShapeEnum)]` implements `Shaped` for a field-less enum and records its variants.
//!
//! Compatible with `syn 2.0`.

mod lower;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::visit::Visit;
use syn::visit_mut::VisitMut;
use syn::{
    Attribute, Data, DeriveInput, Fields, FnArg, ImplItem, ImplItemFn, ItemImpl, ReturnType, Type,
    parse_macro_input,
};

use crate::lower::Op;

/// Implements `shapecode::meta::Shaped` for the type of an inherent `impl` block.
///
/// ```rust,ignore
/// #[shape]
/// impl Point {
///     pub fn new(x: i32, y: i32) -> Self {
///         Self { x, y }
///     }
///
///     pub fn x(&self) -> i32 {
///         self.x
///     }
///
///     pub fn y(&self) -> i32 {
///         self.y
///     }
/// }
/// ```
///
/// Options:
///
/// - `#[shape(self_describing)]` on the block: the type implements `SelfDescribing` and is
///   resolved through its carrier.
/// - `#[shape(constructor)]` on a function: designates it when there are several candidates.
/// - `#[shape(skip)]` on a function: leaves it out of the table.
///
/// The type must be `Send`, must not be generic, and accessors returning a reference require
/// the referenced type to be `Clone`.
#[proc_macro_attribute]
pub fn shape(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut self_describing = false;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("self_describing") {
            self_describing = true;
            return Ok(());
        }
        Err(meta.error("Unknown shape attribute key. Supported: self_describing"))
    });
    parse_macro_input!(attr with parser);

    let mut item = parse_macro_input!(item as ItemImpl);
    match expand_shape(&mut item, self_describing) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => e.to_compile_error().into(),
    }
}

/// Implements `shapecode::meta::Shaped` for a field-less enum.
///
/// Register the variant-name bridge with `ShapeContext::register_enum` before resolving types
/// that hold the enum.
#[proc_macro_derive(ShapeEnum)]
pub fn derive_shape_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(&input.generics, "ShapeEnum does not support generics")
            .to_compile_error()
            .into();
    }

    let data_enum = match input.data {
        Data::Enum(de) => de,
        _ => {
            return syn::Error::new(name.span(), "ShapeEnum only supports enums")
                .to_compile_error()
                .into();
        }
    };

    if data_enum.variants.is_empty() {
        return syn::Error::new(name.span(), "ShapeEnum needs at least one variant")
            .to_compile_error()
            .into();
    }

    let mut idents = Vec::new();
    for variant in &data_enum.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return syn::Error::new_spanned(variant, "ShapeEnum only supports field-less variants")
                .to_compile_error()
                .into();
        }
        idents.push(variant.ident.clone());
    }
    let names: Vec<String> = idents.iter().map(ToString::to_string).collect();
    let indices: Vec<usize> = (0..idents.len()).collect();

    let expanded = quote! {
        impl ::shapecode::meta::Shaped for #name {
            fn shape_info() -> &'static ::shapecode::meta::ClassInfo {
                fn __shape_index_of(this: &dyn ::std::any::Any) -> ::std::option::Option<usize> {
                    match this.downcast_ref::<#name>()? {
                        #(#name::#idents => ::std::option::Option::Some(#indices),)*
                    }
                }

                fn __shape_from_index(
                    index: usize,
                ) -> ::std::option::Option<::shapecode::meta::Object> {
                    match index {
                        #(#indices => ::std::option::Option::Some(::shapecode::rt::boxed(#name::#idents)),)*
                        _ => ::std::option::Option::None,
                    }
                }

                static INFO: ::shapecode::meta::ClassInfo = ::shapecode::meta::ClassInfo {
                    kind: ::shapecode::meta::TypeKind::Enum,
                    constructors: &[],
                    methods: &[],
                    projection: ::std::option::Option::None,
                    enumeration: ::std::option::Option::Some(::shapecode::meta::EnumInfo {
                        variants: &[#(#names),*],
                        index_of: __shape_index_of,
                        from_index: __shape_from_index,
                    }),
                };
                &INFO
            }
        }
    };

    TokenStream::from(expanded)
}

// --- Internal Data Structures ---

/// The implementing type, as seen by the generated code.
struct Subject {
    ty: Type,
    /// Last path segment, used to recognize `TypeName { .. }` and `-> TypeName`.
    ident: String,
    /// Name used in runtime error messages.
    owner: String,
}

/// Options of a `#[shape(...)]` attribute on a function.
#[derive(Default)]
struct FnOptions {
    constructor: bool,
    skip: bool,
}

/// Generated tokens for one table entry: the invoker fn items and the entry expression.
struct Entry {
    items: TokenStream2,
    info: TokenStream2,
}

// --- Generator: Shaped for records ---

fn expand_shape(item: &mut ItemImpl, self_describing: bool) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[shape] goes on an inherent impl block, not a trait impl",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[shape] does not support generic types",
        ));
    }

    let subject = subject_of(&item.self_ty)?;
    let mut constructors = Vec::new();
    let mut methods = Vec::new();

    for impl_item in &mut item.items {
        let ImplItem::Fn(func) = impl_item else {
            continue;
        };
        let options = take_options(&mut func.attrs)?;
        if options.skip {
            continue;
        }

        if is_constructor_candidate(func, &subject) {
            match generate_constructor(constructors.len(), func, options.constructor, &subject)? {
                Some(entry) => constructors.push(entry),
                None => continue,
            }
        } else if options.constructor {
            return Err(syn::Error::new_spanned(
                &func.sig,
                "#[shape(constructor)] marks an associated function returning `Self`",
            ));
        } else if has_shared_receiver(func) {
            methods.push(generate_method(methods.len(), func, &subject));
        }
    }

    let projection = generate_projection(self_describing, &subject);
    let ty = &subject.ty;
    let ctor_items = constructors.iter().map(|e| &e.items);
    let ctor_infos = constructors.iter().map(|e| &e.info);
    let method_items = methods.iter().map(|e| &e.items);
    let method_infos = methods.iter().map(|e| &e.info);
    let projection_items = &projection.items;
    let projection_info = &projection.info;

    Ok(quote! {
        #item

        impl ::shapecode::meta::Shaped for #ty {
            fn shape_info() -> &'static ::shapecode::meta::ClassInfo {
                #(#ctor_items)*
                #(#method_items)*
                #projection_items

                static INFO: ::shapecode::meta::ClassInfo = ::shapecode::meta::ClassInfo {
                    kind: ::shapecode::meta::TypeKind::Record,
                    constructors: &[#(#ctor_infos),*],
                    methods: &[#(#method_infos),*],
                    projection: #projection_info,
                    enumeration: ::std::option::Option::None,
                };
                &INFO
            }
        }
    })
}

fn subject_of(self_ty: &Type) -> syn::Result<Subject> {
    let ident = match self_ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last(),
        _ => None,
    }
    .map(|segment| segment.ident.to_string())
    .ok_or_else(|| syn::Error::new_spanned(self_ty, "#[shape] needs a named type"))?;

    Ok(Subject {
        ty: self_ty.clone(),
        ident,
        owner: quote!(#self_ty).to_string(),
    })
}

/// Parses and strips `#[shape(...)]` attributes from a function.
fn take_options(attrs: &mut Vec<Attribute>) -> syn::Result<FnOptions> {
    let mut options = FnOptions::default();
    for attr in attrs.iter() {
        if attr.path().is_ident("shape") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("constructor") {
                    options.constructor = true;
                    return Ok(());
                }
                if meta.path.is_ident("skip") {
                    options.skip = true;
                    return Ok(());
                }
                Err(meta.error("Unknown shape attribute key. Supported: constructor, skip"))
            })?;
        }
    }
    attrs.retain(|attr| !attr.path().is_ident("shape"));
    Ok(options)
}

fn is_constructor_candidate(func: &ImplItemFn, subject: &Subject) -> bool {
    if func.sig.receiver().is_some()
        || func.sig.asyncness.is_some()
        || func.sig.unsafety.is_some()
    {
        return false;
    }
    match &func.sig.output {
        ReturnType::Type(_, ty) => is_subject_type(ty, subject),
        ReturnType::Default => false,
    }
}

fn is_subject_type(ty: &Type, subject: &Subject) -> bool {
    match ty {
        Type::Path(path) if path.qself.is_none() => {
            path.path.is_ident("Self") || path.path.is_ident(&subject.ident)
        }
        Type::Group(group) => is_subject_type(&group.elem, subject),
        Type::Paren(paren) => is_subject_type(&paren.elem, subject),
        _ => false,
    }
}

fn has_shared_receiver(func: &ImplItemFn) -> bool {
    func.sig
        .receiver()
        .is_some_and(|receiver| receiver.reference.is_some() && receiver.mutability.is_none())
}

fn body_tokens(ops: &[Op]) -> TokenStream2 {
    quote!(&[#(#ops),*])
}

// --- Generator: ConstructorInfo ---

/// Returns `None` for candidates that cannot be invoked with owned arguments.
fn generate_constructor(
    index: usize,
    func: &ImplItemFn,
    marked: bool,
    subject: &Subject,
) -> syn::Result<Option<Entry>> {
    if !func.sig.generics.params.is_empty() {
        if marked {
            return Err(syn::Error::new_spanned(
                &func.sig.generics,
                "a designated constructor cannot be generic",
            ));
        }
        return Ok(None);
    }

    let mut params = Vec::new();
    for input in &func.sig.inputs {
        let FnArg::Typed(arg) = input else {
            continue;
        };
        let ty = replace_self(&arg.ty, &subject.ty);
        if !is_owned_static(&ty) {
            if marked {
                return Err(syn::Error::new_spanned(
                    &arg.ty,
                    "a designated constructor takes owned parameters",
                ));
            }
            return Ok(None);
        }
        params.push((lower::param_name(&arg.pat), ty));
    }

    let fname = &func.sig.ident;
    let name = fname.to_string();
    let invoker = format_ident!("__shape_ctor_{}", index);
    let owner = &subject.owner;
    let self_ty = &subject.ty;
    let count = params.len();

    let vars: Vec<_> = (0..count).map(|i| format_ident!("__arg_{}", i)).collect();
    let takes = params.iter().zip(&vars).enumerate().map(|(i, ((pname, ty), var))| {
        quote! {
            let #var = ::shapecode::rt::take_arg::<#ty>(&mut __args, #owner, #pname, #i)?;
        }
    });
    let param_infos = params.iter().map(|(pname, ty)| {
        quote! {
            ::shapecode::meta::ParamInfo {
                name: #pname,
                ty: ::shapecode::meta::TypeRef::of::<#ty>(),
            }
        }
    });
    let body = body_tokens(&lower::lower_constructor(
        &func.sig,
        &func.block,
        &subject.ident,
    ));

    Ok(Some(Entry {
        items: quote! {
            #[allow(unused_mut)]
            fn #invoker(
                args: ::std::vec::Vec<::shapecode::meta::Object>,
            ) -> ::shapecode::Result<::shapecode::meta::Object> {
                let mut __args = ::shapecode::rt::arguments(args, #count, #owner)?;
                #(#takes)*
                ::std::result::Result::Ok(::shapecode::rt::boxed(<#self_ty>::#fname(#(#vars),*)))
            }
        },
        info: quote! {
            ::shapecode::meta::ConstructorInfo {
                name: #name,
                params: &[#(#param_infos),*],
                body: #body,
                marked: #marked,
                invoke: #invoker,
            }
        },
    }))
}

// --- Generator: MethodInfo ---

fn generate_method(index: usize, func: &ImplItemFn, subject: &Subject) -> Entry {
    let fname = &func.sig.ident;
    let name = fname.to_string();
    let argc = func.sig.inputs.len().saturating_sub(1);
    let ops = lower::lower_method(&func.sig, &func.block, &subject.ident);
    let body = body_tokens(&ops);

    let invocable = argc == 0
        && func.sig.generics.params.is_empty()
        && func.sig.asyncness.is_none()
        && func.sig.unsafety.is_none();
    let conversion = if invocable && reads_a_field(&ops) {
        owned_return(&func.sig.output, &subject.ty)
    } else {
        None
    };

    let Some((owned, convert)) = conversion else {
        return Entry {
            items: TokenStream2::new(),
            info: quote! {
                ::shapecode::meta::MethodInfo {
                    name: #name,
                    argc: #argc,
                    body: #body,
                    returns: ::std::option::Option::None,
                    invoke: ::std::option::Option::None,
                }
            },
        };
    };

    let invoker = format_ident!("__shape_method_{}", index);
    let owner = &subject.owner;
    let self_ty = &subject.ty;

    Entry {
        items: quote! {
            fn #invoker(
                this: &dyn ::std::any::Any,
            ) -> ::shapecode::Result<::shapecode::meta::Object> {
                let this = ::shapecode::rt::receiver::<#self_ty>(this, #owner)?;
                let value = this.#fname();
                ::std::result::Result::Ok(::shapecode::rt::boxed(#convert))
            }
        },
        info: quote! {
            ::shapecode::meta::MethodInfo {
                name: #name,
                argc: #argc,
                body: #body,
                returns: ::std::option::Option::Some(::shapecode::meta::TypeKey::of::<#owned>()),
                invoke: ::std::option::Option::Some(#invoker),
            }
        },
    }
}

/// `true` for bodies starting with a field read followed only by single-operand calls.
fn reads_a_field(ops: &[Op]) -> bool {
    let [Op::LoadSelf, Op::GetField(_), rest @ ..] = ops else {
        return false;
    };
    for op in rest {
        match op {
            Op::Invoke { argc: 1, .. } => continue,
            Op::Return => return true,
            _ => return false,
        }
    }
    false
}

/// The owned form of a return type and the expression converting `value` into it.
fn owned_return(output: &ReturnType, self_ty: &Type) -> Option<(Type, TokenStream2)> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let ty = replace_self(ty, self_ty);

    let Type::Reference(reference) = &ty else {
        return is_owned_static(&ty).then(|| (ty.clone(), quote!(value)));
    };
    if reference.mutability.is_some() {
        return None;
    }

    match &*reference.elem {
        Type::Path(path) if path.qself.is_none() && path.path.is_ident("str") => Some((
            syn::parse_quote!(::std::string::String),
            quote!(::std::borrow::ToOwned::to_owned(value)),
        )),
        Type::Slice(slice) if is_owned_static(&slice.elem) => {
            let elem = &slice.elem;
            Some((
                syn::parse_quote!(::std::vec::Vec<#elem>),
                quote!(<[#elem]>::to_vec(value)),
            ))
        }
        elem if is_owned_static(elem) => Some((
            elem.clone(),
            quote!(<#elem as ::std::clone::Clone>::clone(value)),
        )),
        _ => None,
    }
}

// --- Generator: Projection ---

fn generate_projection(self_describing: bool, subject: &Subject) -> Entry {
    if !self_describing {
        return Entry {
            items: TokenStream2::new(),
            info: quote!(::std::option::Option::None),
        };
    }

    let self_ty = &subject.ty;
    let owner = &subject.owner;
    let contract = quote!(<#self_ty as ::shapecode::meta::SelfDescribing>);

    Entry {
        items: quote! {
            fn __shape_to_carrier(
                this: &dyn ::std::any::Any,
            ) -> ::shapecode::Result<::shapecode::meta::Object> {
                let this = ::shapecode::rt::receiver::<#self_ty>(this, #owner)?;
                ::std::result::Result::Ok(::shapecode::rt::boxed(#contract::to_carrier(this)))
            }

            fn __shape_from_carrier(
                carrier: ::shapecode::meta::Object,
            ) -> ::shapecode::Result<::shapecode::meta::Object> {
                let carrier = ::shapecode::rt::downcast::<#contract::Carrier>(carrier, #owner)?;
                ::std::result::Result::Ok(::shapecode::rt::boxed(#contract::from_carrier(carrier)))
            }
        },
        info: quote! {
            ::std::option::Option::Some(::shapecode::meta::Projection {
                carrier: ::shapecode::meta::TypeRef::of::<#contract::Carrier>(),
                to_carrier: __shape_to_carrier,
                from_carrier: __shape_from_carrier,
            })
        },
    }
}

// --- Type Helpers ---

/// Replaces `Self` with the implementing type; nested fn items cannot name `Self`.
fn replace_self(ty: &Type, self_ty: &Type) -> Type {
    struct ReplaceSelf<'a>(&'a Type);

    impl VisitMut for ReplaceSelf<'_> {
        fn visit_type_mut(&mut self, ty: &mut Type) {
            if let Type::Path(path) = ty {
                if path.qself.is_none() && path.path.is_ident("Self") {
                    *ty = self.0.clone();
                    return;
                }
            }
            syn::visit_mut::visit_type_mut(self, ty);
        }
    }

    let mut ty = ty.clone();
    ReplaceSelf(self_ty).visit_type_mut(&mut ty);
    ty
}

/// `true` if the type can be named in a `static` and boxed: no references, lifetimes,
/// `impl Trait` or inferred parts.
fn is_owned_static(ty: &Type) -> bool {
    #[derive(Default)]
    struct Borrowed(bool);

    impl<'ast> Visit<'ast> for Borrowed {
        fn visit_lifetime(&mut self, _: &'ast syn::Lifetime) {
            self.0 = true;
        }
        fn visit_type_reference(&mut self, _: &'ast syn::TypeReference) {
            self.0 = true;
        }
        fn visit_type_impl_trait(&mut self, _: &'ast syn::TypeImplTrait) {
            self.0 = true;
        }
        fn visit_type_infer(&mut self, _: &'ast syn::TypeInfer) {
            self.0 = true;
        }
    }

    let mut borrowed = Borrowed::default();
    borrowed.visit_type(ty);
    !borrowed.0
}
