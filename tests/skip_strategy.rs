//! Skip strategies applied to derived types through the Context façade.

use shapr::{Context, Error, IgnoreFields, PayloadError, Shape, Value};

#[derive(Shape, Debug, Clone, PartialEq)]
struct Account {
    id: u32,
    #[shape(default)]
    secret: String,
}

#[derive(Shape, Debug, Clone, PartialEq)]
struct Ledger {
    owner: String,
    accounts: Vec<Account>,
    #[shape(skip)]
    dirty: bool,
}

#[derive(Shape, Debug, Clone, PartialEq)]
struct Session {
    user: String,
    token: String,
}

fn hiding_secrets() -> Context {
    Context::builder()
        .skip_strategy(IgnoreFields::new().ignore("Account", "secret"))
        .build()
}

#[test]
fn ignored_fields_stay_out_of_the_payload() -> anyhow::Result<()> {
    let ctx = hiding_secrets();
    let account = Account {
        id: 1,
        secret: "x".to_string(),
    };

    let text = ctx.to_payload(account)?;
    assert_eq!(text, "{id:u32(1)}1");

    let back: Account = ctx.from_payload(&text)?;
    assert_eq!(
        back,
        Account {
            id: 1,
            secret: String::new()
        }
    );
    Ok(())
}

#[test]
fn ignored_fields_in_nested_records() -> anyhow::Result<()> {
    let ctx = hiding_secrets();
    let ledger = Ledger {
        owner: "Bo".to_string(),
        accounts: vec![
            Account {
                id: 7,
                secret: "pin".to_string(),
            },
            Account {
                id: 42,
                secret: "pw".to_string(),
            },
        ],
        dirty: true,
    };

    let text = ctx.to_payload(ledger.clone())?;
    assert_eq!(text, "{owner:string(2);accounts:{id:u32(2)}[2]}Bo2 742");

    let metaclass = ctx.metaclass_of::<Ledger>()?;
    let accounts = metaclass.member("accounts").expect("accounts member");
    assert!(accounts.is_skipped("secret"));
    assert!(metaclass.is_skipped("dirty"));

    let back: Ledger = ctx.from_payload(&text)?;
    assert_eq!(back.owner, "Bo");
    assert_eq!(
        back.accounts.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![7, 42]
    );
    assert!(back.accounts.iter().all(|a| a.secret.is_empty()));
    assert!(!back.dirty);
    Ok(())
}

#[test]
fn ignored_field_without_default_cannot_be_rebuilt() -> anyhow::Result<()> {
    let ctx = Context::builder()
        .skip_strategy(IgnoreFields::new().ignore("Session", "token"))
        .build();
    let session = Session {
        user: "ana".to_string(),
        token: "t0k".to_string(),
    };

    let text = ctx.to_payload(session)?;
    assert_eq!(text, "{user:string(3)}ana");
    assert!(matches!(
        ctx.from_payload::<Session>(&text),
        Err(Error::Conversion(shapr::ConversionError::MissingField(field))) if field == "token"
    ));
    Ok(())
}

#[test]
fn only_skipped_fields_are_dropped() -> anyhow::Result<()> {
    let ctx = hiding_secrets();
    let metaclass = ctx.metaclass_of::<Account>()?;

    let stray = Value::record([("id", Value::U32(1)), ("pin", Value::from("0000"))]);
    assert!(matches!(
        ctx.encode_value(&metaclass, &stray),
        Err(Error::Payload(PayloadError::UnknownField { field, .. })) if field == "pin"
    ));
    Ok(())
}
