//! Shared readers, factories and contexts under concurrent first use.

use std::sync::Arc;
use std::thread;

use shapr::{
    BasicMetaclassReader, BasicParserFactory, Context, MetaclassReader, ParserFactory, Shape, Type,
};

#[derive(Shape, Debug, Clone, PartialEq)]
struct Reading {
    sensor: String,
    celsius: f64,
    flags: Vec<bool>,
}

const THREADS: usize = 8;

#[test]
fn reader_builds_each_metaclass_once() {
    let reader = BasicMetaclassReader::new();
    let ty = reader.register::<Reading>().expect("register");

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| reader.read(&ty).expect("read")))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect()
    });

    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(reader.cached(), 1);
}

#[test]
fn factory_builds_each_mapper_once() {
    let reader = BasicMetaclassReader::new();
    let ty = reader.register::<Reading>().expect("register");
    let metaclass = reader.read(&ty).expect("read");
    let factory = BasicParserFactory::new();

    let mappers: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| scope.spawn(|| factory.create(&metaclass).expect("create")))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect()
    });

    assert!(mappers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    // record, sensor, celsius, flags and one flag element
    assert_eq!(factory.cached(), 5);
}

#[test]
fn context_round_trips_from_many_threads() {
    let ctx = Context::new();

    thread::scope(|scope| {
        for i in 0..THREADS {
            let ctx = &ctx;
            scope.spawn(move || {
                let reading = Reading {
                    sensor: format!("probe-{i}"),
                    celsius: i as f64 * 1.5,
                    flags: vec![i % 2 == 0; i],
                };
                let text = ctx.to_payload(reading.clone()).expect("encode");
                let back: Reading = ctx.from_payload(&text).expect("decode");
                assert_eq!(back, reading);
            });
        }
    });

    let list = ctx.list_metaclass_of::<Reading>().expect("list metaclass");
    assert_eq!(list.element_type(), &Type::named("Reading"));
}
