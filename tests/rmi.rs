//! End-to-end scenarios for the RMI fabric, driven through a small test
//! interface served in-process.

use dfs::rmi::{
    Dispatch, InterfaceDescriptor, MethodDescriptor, Skeleton, StubHandle, RMI_EXCEPTION,
};
use dfs::{DfsError, Result};
use serde_json::{json, Value};
use std::thread;

fn calculator() -> InterfaceDescriptor {
    InterfaceDescriptor::new("Calculator", vec![divide_method()])
}

fn divide_method() -> MethodDescriptor {
    MethodDescriptor::new(
        "divide",
        "i64",
        &["i64", "i64"],
        &[RMI_EXCEPTION, "DivisionByZero"],
    )
}

struct Calculator;

impl Dispatch for Calculator {
    fn dispatch(&self, method: &MethodDescriptor, mut args: Vec<Value>) -> Result<Value> {
        match method.name() {
            "divide" => {
                let a: i64 = serde_json::from_value(args[0].take()).unwrap();
                let b: i64 = serde_json::from_value(args[1].take()).unwrap();
                if b == 0 {
                    Err(DfsError::Application {
                        name: "DivisionByZero".to_string(),
                        message: format!("{} / 0", a),
                    })
                } else {
                    Ok(json!(a / b))
                }
            }
            other => Err(DfsError::NoSuchMethod(other.to_string())),
        }
    }
}

fn started_skeleton() -> Skeleton<Calculator> {
    let skeleton = Skeleton::new(calculator(), Calculator).unwrap();
    skeleton.start().unwrap();
    skeleton
}

fn divide(stub: &StubHandle, a: i64, b: i64) -> Result<i64> {
    let value = stub.invoke(&divide_method(), vec![json!(a), json!(b)])?;
    Ok(serde_json::from_value(value).unwrap())
}

#[test]
fn remote_calls_behave_like_local_ones() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();

    assert_eq!(divide(&stub, 84, 2).unwrap(), 42);
    assert_eq!(divide(&stub, -9, 3).unwrap(), -3);

    skeleton.stop();
}

#[test]
fn remote_failures_surface_at_the_call_site() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();

    match divide(&stub, 1, 0) {
        Err(DfsError::Application { name, .. }) => assert_eq!(name, "DivisionByZero"),
        other => panic!("expected the original failure, got {:?}", other),
    }

    skeleton.stop();
}

#[test]
fn unknown_methods_are_rejected() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();

    let bogus = MethodDescriptor::new("modulo", "i64", &["i64", "i64"], &[RMI_EXCEPTION]);
    assert!(matches!(
        stub.invoke(&bogus, vec![json!(1), json!(2)]),
        Err(DfsError::NoSuchMethod(_))
    ));

    skeleton.stop();
}

#[test]
fn argument_counts_are_checked_against_the_descriptor() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();

    assert!(matches!(
        stub.invoke(&divide_method(), vec![json!(1)]),
        Err(DfsError::InvalidArgument(_))
    ));

    skeleton.stop();
}

#[test]
fn stubs_survive_serialization_and_stay_wired() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();

    let encoded = serde_json::to_string(&stub).unwrap();
    let decoded: StubHandle = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, stub);
    assert_eq!(divide(&decoded, 10, 5).unwrap(), 2);

    skeleton.stop();
}

#[test]
fn concurrent_invocations_all_complete() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();

    let workers: Vec<_> = (1..=8)
        .map(|n| {
            let stub = stub.clone();
            thread::spawn(move || divide(&stub, 12 * n, n).unwrap())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 12);
    }

    skeleton.stop();
}

#[test]
fn stub_creation_requires_an_address() {
    let skeleton = Skeleton::new(calculator(), Calculator).unwrap();
    assert!(matches!(
        StubHandle::of_skeleton(&skeleton),
        Err(DfsError::IllegalState(_))
    ));

    skeleton.start().unwrap();
    assert!(StubHandle::of_skeleton(&skeleton).is_ok());
    skeleton.stop();
}

#[test]
fn preassigned_addresses_allow_stubs_before_start() {
    let address = "127.0.0.1:0".parse().unwrap();
    let skeleton = Skeleton::bound(calculator(), Calculator, address).unwrap();
    // the preassigned address is usable even though nothing is bound yet
    assert!(StubHandle::of_skeleton(&skeleton).is_ok());
}

#[test]
fn stopped_skeletons_cannot_restart() {
    let skeleton = started_skeleton();
    let stub = StubHandle::of_skeleton(&skeleton).unwrap();
    skeleton.stop();

    assert!(matches!(
        skeleton.start(),
        Err(DfsError::IllegalState(_))
    ));
    // the address outlives the skeleton, but calls now fail at the wire
    assert!(skeleton.address().is_some());
    assert!(matches!(divide(&stub, 1, 1), Err(DfsError::Rmi(_))));
}

#[test]
fn double_start_is_rejected() {
    let skeleton = started_skeleton();
    assert!(matches!(
        skeleton.start(),
        Err(DfsError::IllegalState(_))
    ));
    skeleton.stop();
}
