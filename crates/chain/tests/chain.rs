//! Execution-context, dispatcher, and host-API scenarios.

mod common;

use std::sync::Arc;

use arbor_chain::thunk::system::{
    ApplyBlockArgs, CallContractArgs, CallContractReturn, GetObjectArgs, GetObjectReturn,
    LogArgs, PutObjectArgs, PutObjectReturn,
};
use arbor_chain::{
    host, ids, spaces, ChainError, ExecutionContext, HostApi, Intent, Privilege, StackFrame,
    ThunkDispatcher,
};
use arbor_common::{
    Block, BlockHeader, Multihash, Operation, SystemCallTarget, Transaction, TransactionPayload,
};
use arbor_statedb::{ObjectSpace, StateDb, StateNode};
use common::{decode, encode, seeded_db, ScriptVm};

const OVERRIDE_SID: u32 = 900;

struct Fixture {
    db: Arc<StateDb>,
    node: StateNode,
    ctx: ExecutionContext,
}

fn fixture(intent: Intent) -> Fixture {
    let dispatcher = ThunkDispatcher::shared();
    let db = seeded_db(&dispatcher);

    // Contracts available to every test.
    for (id, script) in [
        (&b"echo-contract"[..], &b"echo"[..]),
        (&b"probe-contract"[..], &b"probe"[..]),
        (&b"recurse-contract"[..], &b"recurse"[..]),
        (&b"fail-contract"[..], &b"fail"[..]),
    ] {
        db.put_root_object(&spaces::contract_bytecode(), id, script)
            .unwrap();
    }
    // The probe contract overrides one syscall id.
    db.put_root_object(
        &ObjectSpace::system_call_dispatch(),
        &OVERRIDE_SID.to_be_bytes(),
        &encode(&SystemCallTarget::Bundle {
            contract_id: b"probe-contract".to_vec(),
            entry_point: 0,
        }),
    )
    .unwrap();

    let node = db
        .create_writable_node(&db.get_head().id(), &Multihash::sha2_256(b"work"))
        .unwrap();
    let mut ctx = ExecutionContext::new(Arc::new(ScriptVm), dispatcher, intent);
    ctx.set_state_node(Some(node.clone()), None);
    Fixture { db, node, ctx }
}

#[test]
fn syscall_override_runs_in_kernel_mode_with_user_caller() {
    let mut f = fixture(Intent::ApplyBlock);
    // A user-mode contract invokes the overridden syscall.
    f.ctx
        .push_frame(StackFrame::contract(
            b"alice".to_vec(),
            0,
            Vec::new(),
            Privilege::UserMode,
        ))
        .unwrap();

    let ret = host::invoke_system_call(&mut f.ctx, OVERRIDE_SID, &[], 1024).unwrap();
    // The override observed its caller in user mode...
    assert_eq!(ret[0], Privilege::UserMode.value());
    // ...while running with kernel capabilities itself...
    assert_eq!(ret[1], 1);
    // ...and the caller identity is the invoking contract.
    assert_eq!(&ret[2..], &b"alice"[..]);

    // The same call fails when the return does not fit the caller's buffer.
    let err = host::invoke_system_call(&mut f.ctx, OVERRIDE_SID, &[], 2).unwrap_err();
    assert!(matches!(
        err,
        ChainError::InsufficientReturnBuffer { needed: 7, have: 2 }
    ));
}

#[test]
fn invoke_thunk_is_kernel_only() {
    let mut f = fixture(Intent::ApplyBlock);
    let log = encode(&LogArgs {
        message: "hello".into(),
    });

    f.ctx
        .push_frame(StackFrame::system(Privilege::UserMode))
        .unwrap();
    let mut api = HostApi::new(&mut f.ctx);
    assert!(matches!(
        api.invoke_thunk(ids::LOG, usize::MAX, &log),
        Err(ChainError::InsufficientPrivileges)
    ));

    f.ctx.set_privilege(Privilege::KernelMode).unwrap();
    let mut api = HostApi::new(&mut f.ctx);
    api.invoke_thunk(ids::LOG, usize::MAX, &log).unwrap();
}

#[test]
fn unknown_syscall_without_override_is_not_found() {
    let mut f = fixture(Intent::ApplyBlock);
    f.ctx
        .push_frame(StackFrame::system(Privilege::KernelMode))
        .unwrap();
    assert!(matches!(
        host::invoke_system_call(&mut f.ctx, 9999, &[], usize::MAX),
        Err(ChainError::ThunkNotFound(9999))
    ));
}

#[test]
fn user_mode_is_confined_to_its_own_space() {
    let mut f = fixture(Intent::ApplyBlock);
    f.ctx
        .push_frame(StackFrame::contract(
            b"alice".to_vec(),
            0,
            Vec::new(),
            Privilege::UserMode,
        ))
        .unwrap();

    // Reading the contract's own space is fine.
    let own = ObjectSpace::contract(b"alice");
    let ret: GetObjectReturn = host::system_call(
        &mut f.ctx,
        ids::GET_OBJECT,
        &GetObjectArgs {
            space: own.as_bytes().to_vec(),
            key: b"k".to_vec(),
        },
    )
    .unwrap();
    assert_eq!(ret.value, None);

    // Touching the metadata space is not.
    let err = host::system_call::<_, PutObjectReturn>(
        &mut f.ctx,
        ids::PUT_OBJECT,
        &PutObjectArgs {
            space: b"metadata".to_vec(),
            key: b"k".to_vec(),
            value: Some(b"v".to_vec()),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::InsufficientPrivileges));
}

#[test]
fn call_contract_round_trips_arguments() {
    let mut f = fixture(Intent::ApplyBlock);
    f.ctx
        .push_frame(StackFrame::system(Privilege::KernelMode))
        .unwrap();
    let ret: CallContractReturn = host::system_call(
        &mut f.ctx,
        ids::CALL_CONTRACT,
        &CallContractArgs {
            contract_id: b"echo-contract".to_vec(),
            entry_point: 7,
            args: b"hello".to_vec(),
        },
    )
    .unwrap();
    assert_eq!(ret.value, b"hello");
}

#[test]
fn contract_failure_exit_code_propagates() {
    let mut f = fixture(Intent::ApplyBlock);
    f.ctx
        .push_frame(StackFrame::system(Privilege::KernelMode))
        .unwrap();
    let err = host::system_call::<_, CallContractReturn>(
        &mut f.ctx,
        ids::CALL_CONTRACT,
        &CallContractArgs {
            contract_id: b"fail-contract".to_vec(),
            entry_point: 0,
            args: Vec::new(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::ContractExit(1)));
}

#[test]
fn unbounded_recursion_hits_the_stack_limit() {
    let mut f = fixture(Intent::ApplyBlock);
    f.ctx
        .push_frame(StackFrame::system(Privilege::KernelMode))
        .unwrap();
    let err = host::system_call::<_, CallContractReturn>(
        &mut f.ctx,
        ids::CALL_CONTRACT,
        &CallContractArgs {
            contract_id: b"recurse-contract".to_vec(),
            entry_point: 0,
            args: b"recurse-contract".to_vec(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::StackOverflow));
    // Every frame pushed on the way down was popped on the way back up.
    assert_eq!(f.ctx.stack_depth(), 1);
}

#[test]
fn read_only_context_rejects_writes() {
    let mut f = fixture(Intent::ReadOnly);
    f.ctx
        .push_frame(StackFrame::system(Privilege::KernelMode))
        .unwrap();
    let err = host::system_call::<_, PutObjectReturn>(
        &mut f.ctx,
        ids::PUT_OBJECT,
        &PutObjectArgs {
            space: b"metadata".to_vec(),
            key: b"k".to_vec(),
            value: Some(b"v".to_vec()),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::ReadOnlyContext));
}

#[test]
fn session_underflow_aborts_with_out_of_resources() {
    let mut f = fixture(Intent::ApplyBlock);
    f.ctx
        .push_frame(StackFrame::system(Privilege::KernelMode))
        .unwrap();
    // Every thunk costs 100 under the default genesis pricing.
    f.ctx.make_session(50);
    let err = host::system_call::<_, GetObjectReturn>(
        &mut f.ctx,
        ids::GET_OBJECT,
        &GetObjectArgs {
            space: b"metadata".to_vec(),
            key: b"k".to_vec(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::OutOfResources));
}

#[test]
fn failed_transaction_reverts_but_the_block_continues() {
    let mut f = fixture(Intent::ApplyBlock);

    let starved = Transaction {
        payload: TransactionPayload {
            resource_limit: 50,
            operations: vec![Operation::UploadContract {
                contract_id: b"starved".to_vec(),
                bytecode: b"echo".to_vec(),
            }],
        },
        nonce: 1,
    };
    let healthy = Transaction {
        payload: TransactionPayload {
            resource_limit: 1_000_000,
            operations: vec![Operation::UploadContract {
                contract_id: b"healthy".to_vec(),
                bytecode: b"echo".to_vec(),
            }],
        },
        nonce: 2,
    };
    let starved_id = starved.id();

    let block = Block {
        header: BlockHeader {
            previous: f.db.get_root().id(),
            height: 1,
            timestamp: 0,
            nonce: 0,
        },
        transactions: vec![starved, healthy],
        passives: Vec::new(),
    };

    f.ctx
        .with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
            host::system_call::<_, ()>(ctx, ids::APPLY_BLOCK, &ApplyBlockArgs { block })
        })
        .unwrap();

    // The starved transaction's writes were dropped; the healthy one stands.
    assert_eq!(
        f.node
            .get_object(&spaces::contract_bytecode(), b"starved")
            .unwrap(),
        None
    );
    assert_eq!(
        f.node
            .get_object(&spaces::contract_bytecode(), b"healthy")
            .unwrap()
            .unwrap(),
        b"echo"
    );
    assert_eq!(f.ctx.receipt().failed_transactions, vec![starved_id]);
}

#[test]
fn set_system_call_requires_kernel_authority() {
    let mut f = fixture(Intent::ApplyBlock);

    let install = Transaction {
        payload: TransactionPayload {
            resource_limit: 1_000_000,
            operations: vec![Operation::SetSystemCall {
                call_id: OVERRIDE_SID + 1,
                target: SystemCallTarget::Bundle {
                    contract_id: b"probe-contract".to_vec(),
                    entry_point: 0,
                },
            }],
        },
        nonce: 1,
    };
    let block = Block {
        header: BlockHeader {
            previous: f.db.get_root().id(),
            height: 1,
            timestamp: 0,
            nonce: 0,
        },
        transactions: vec![install],
        passives: Vec::new(),
    };

    f.ctx
        .with_frame(StackFrame::system(Privilege::KernelMode), |ctx| {
            host::system_call::<_, ()>(ctx, ids::APPLY_BLOCK, &ApplyBlockArgs { block })
        })
        .unwrap();
    assert!(f.ctx.receipt().failed_transactions.is_empty());

    // The override is now recorded in the dispatch space.
    let recorded = f
        .node
        .get_object(
            &ObjectSpace::system_call_dispatch(),
            &(OVERRIDE_SID + 1).to_be_bytes(),
        )
        .unwrap()
        .unwrap();
    let target: SystemCallTarget = decode(&recorded);
    assert!(matches!(target, SystemCallTarget::Bundle { .. }));
}
