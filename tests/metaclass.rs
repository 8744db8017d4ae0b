//! Metaclass introspection through derived descriptors.

use shapr::{
    BasicMetaclassReader, Cardinality, Context, CyclicTypeError, Error, LeafKind, Metaclass,
    MetaclassReader, ReadError, Shape, Type, TypeRegistry,
};

#[derive(Shape, Debug, Clone, PartialEq)]
struct Person {
    name: String,
    age: i64,
}

#[derive(Shape, Debug, Clone, PartialEq)]
struct Author {
    first: String,
    last: String,
}

#[derive(Shape, Debug, Clone, PartialEq)]
struct Book {
    title: String,
    authors: Vec<Author>,
    #[shape(kind = "isbn")]
    isbn: String,
}

#[derive(Shape, Debug)]
struct Category {
    label: String,
    children: Vec<Category>,
}

fn reader_for<T: Shape>() -> (BasicMetaclassReader, Type) {
    let reader = BasicMetaclassReader::new();
    let ty = reader.register::<T>().expect("register");
    (reader, ty)
}

#[test]
fn members_follow_declared_order() -> anyhow::Result<()> {
    let ctx = Context::new();
    let person = ctx.metaclass_of::<Person>()?;

    let members: Vec<(&str, Option<&LeafKind>)> = person
        .members()
        .iter()
        .map(|m| (m.name(), m.leaf_kind()))
        .collect();
    assert_eq!(
        members,
        vec![
            ("name", Some(&LeafKind::String)),
            ("age", Some(&LeafKind::S64))
        ]
    );
    Ok(())
}

#[test]
fn repeated_structure_with_explicit_element() -> anyhow::Result<()> {
    let (reader, book) = reader_for::<Book>();
    let author = reader.read(&Type::named("Author"))?;

    let meta = reader.read_with_element(&Type::raw_list(), &book)?;
    assert!(meta.is_repeated());
    assert_eq!(meta.element_type(), &book);

    let authors = meta.member("authors").expect("authors member");
    assert_eq!(authors.cardinality(), Cardinality::Repeated);
    assert_eq!(authors.shape(), author.shape());
    assert_eq!(authors.element_type(), author.element_type());

    let isbn = meta.member("isbn").expect("isbn member");
    assert_eq!(isbn.leaf_kind(), Some(&LeafKind::Custom("isbn".into())));
    Ok(())
}

#[test]
fn reads_are_deterministic() {
    let (first, ty) = reader_for::<Book>();
    let (second, _) = reader_for::<Book>();

    let a = first.read(&ty).expect("first read");
    let b = second.read(&ty).expect("second read");
    assert_eq!(*a, *b);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.to_tree(), b.to_tree());
}

#[test]
fn metaclass_persists_as_json() -> anyhow::Result<()> {
    let (reader, ty) = reader_for::<Book>();
    let meta = reader.read(&ty)?;

    let json = meta.to_json()?;
    let restored = Metaclass::from_json(&json)?;
    assert_eq!(restored, *meta);
    assert_eq!(restored.fingerprint(), meta.fingerprint());
    Ok(())
}

#[test]
fn self_reference_is_a_cycle() {
    let ctx = Context::new();
    let err = ctx.metaclass_of::<Category>().unwrap_err();
    match err {
        Error::Read(ReadError::Cyclic(CyclicTypeError { chain })) => {
            assert_eq!(chain, vec!["Category", "Category"]);
        }
        other => panic!("expected a cycle, got {other}"),
    }

    // the failure is not cached
    assert!(ctx.metaclass_of::<Category>().is_err());
}

#[test]
fn shared_definitions_across_types() -> anyhow::Result<()> {
    let ctx = Context::new();
    ctx.metaclass_of::<Book>()?;

    let mut registry = TypeRegistry::new();
    Author::describe(&mut registry);
    ctx.define(&registry)?;

    let author = ctx.reader().read(&Type::named("Author"))?;
    assert_eq!(author.members().len(), 2);
    Ok(())
}
