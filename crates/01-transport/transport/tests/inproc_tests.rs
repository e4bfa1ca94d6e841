//! End-to-end behaviour of the in-process context: routing, queue limits,
//! blocking wakeups, and content lifetime across send/recv.

use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use transport::{
    msg_close, msg_data, msg_init, msg_init_data, msg_init_size, msg_size, Context, ContextConfig,
    Errno, Flags, FreeFn, OptionName, OptionValue, RawMsg, Region, SocketHandle, SocketKind,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn empty() -> RawMsg {
    let mut slot = MaybeUninit::uninit();
    msg_init(&mut slot).expect("init");
    // SAFETY: `msg_init` wrote the descriptor.
    unsafe { slot.assume_init() }
}

fn with_bytes(bytes: &[u8]) -> RawMsg {
    let region = Region::copy_from_slice(bytes).expect("region");
    let data = region.as_non_null();
    let len = region.len();
    let free: FreeFn = Box::new(move |_, _| drop(region));
    let mut slot = MaybeUninit::uninit();
    // SAFETY: the region is owned by the callback and outlives the descriptor.
    unsafe { msg_init_data(&mut slot, data, len, free) }.expect("init data");
    // SAFETY: initialisation succeeded.
    unsafe { slot.assume_init() }
}

fn bytes(msg: &RawMsg) -> Vec<u8> {
    let len = msg_size(msg);
    // SAFETY: `msg_data` is valid for `msg_size` bytes while `msg` is open.
    unsafe { std::slice::from_raw_parts(msg_data(msg).as_ptr(), len) }.to_vec()
}

fn send_bytes(
    ctx: &Context,
    socket: SocketHandle,
    payload: &[u8],
    flags: Flags,
) -> Result<(), Errno> {
    let mut msg = with_bytes(payload);
    let result = ctx.send(socket, &msg, flags);
    msg_close(&mut msg).expect("close");
    result
}

fn recv_bytes(ctx: &Context, socket: SocketHandle, flags: Flags) -> Result<Vec<u8>, Errno> {
    let mut msg = empty();
    let result = ctx.recv(socket, &mut msg, flags).map(|()| bytes(&msg));
    msg_close(&mut msg).expect("close");
    result
}

fn pair(
    ctx: &Context,
    bound: SocketKind,
    connected: SocketKind,
    endpoint: &str,
) -> (SocketHandle, SocketHandle) {
    let a = ctx.socket(bound).expect("socket");
    let b = ctx.socket(connected).expect("socket");
    ctx.bind(a, endpoint).expect("bind");
    ctx.connect(b, endpoint).expect("connect");
    (a, b)
}

#[test]
fn pair_round_trip() {
    init_logging();
    let ctx = Context::new();
    let (a, b) = pair(&ctx, SocketKind::Pair, SocketKind::Pair, "inproc://pair");

    send_bytes(&ctx, b, b"ping", Flags::NONE).expect("send");
    assert_eq!(recv_bytes(&ctx, a, Flags::NONE).expect("recv"), b"ping");
    send_bytes(&ctx, a, b"pong", Flags::DONTWAIT).expect("send back");
    assert_eq!(recv_bytes(&ctx, b, Flags::DONTWAIT).expect("recv back"), b"pong");
}

#[test]
fn endpoint_errors() {
    let ctx = Context::new();
    let a = ctx.socket(SocketKind::Pair).expect("socket");
    let b = ctx.socket(SocketKind::Pair).expect("socket");
    let push = ctx.socket(SocketKind::Push).expect("socket");

    assert_eq!(ctx.connect(b, "inproc://missing"), Err(Errno::ECONNREFUSED));
    assert_eq!(ctx.bind(a, "tcp://127.0.0.1:5555"), Err(Errno::EPROTONOSUPPORT));
    ctx.bind(a, "inproc://taken").expect("bind");
    assert_eq!(ctx.bind(b, "inproc://taken"), Err(Errno::EADDRINUSE));
    assert_eq!(ctx.connect(push, "inproc://taken"), Err(Errno::EINVAL));

    ctx.close(a).expect("close");
    ctx.bind(b, "inproc://taken").expect("endpoint released on close");
}

#[test]
fn unknown_handles_fail_with_enotsock() {
    let ctx = Context::new();
    let bogus = SocketHandle::from_raw(9_999);
    let msg = empty();
    assert_eq!(ctx.send(bogus, &msg, Flags::NONE), Err(Errno::ENOTSOCK));
    assert_eq!(ctx.bind(bogus, "inproc://x"), Err(Errno::ENOTSOCK));
    assert_eq!(ctx.close(bogus), Err(Errno::ENOTSOCK));
}

#[test]
fn nonblocking_calls_report_would_block() {
    let ctx = Context::new();
    let push = ctx.socket(SocketKind::Push).expect("socket");
    let pull = ctx.socket(SocketKind::Pull).expect("socket");

    let err = send_bytes(&ctx, push, b"nobody", Flags::DONTWAIT).expect_err("no peer");
    assert!(err.is_would_block());
    let err = recv_bytes(&ctx, pull, Flags::DONTWAIT).expect_err("idle");
    assert!(err.is_would_block());
}

#[test]
fn direction_is_enforced() {
    let ctx = Context::new();
    let (pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://dir");
    assert_eq!(send_bytes(&ctx, pull, b"x", Flags::NONE), Err(Errno::ENOTSUP));
    assert_eq!(recv_bytes(&ctx, push, Flags::NONE), Err(Errno::ENOTSUP));
}

#[test]
fn high_water_mark_bounds_each_pipe() {
    let ctx = Context::new();
    let (pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://hwm");
    ctx.setsockopt(push, OptionName::Hwm.as_raw(), &OptionValue::UInt64(2).encode())
        .expect("hwm");

    send_bytes(&ctx, push, b"1", Flags::DONTWAIT).expect("first");
    send_bytes(&ctx, push, b"2", Flags::DONTWAIT).expect("second");
    assert_eq!(send_bytes(&ctx, push, b"3", Flags::DONTWAIT), Err(Errno::EAGAIN));
    assert_eq!(ctx.pending(pull), Ok(2));

    assert_eq!(recv_bytes(&ctx, pull, Flags::NONE).expect("recv"), b"1");
    send_bytes(&ctx, push, b"3", Flags::DONTWAIT).expect("room again");
}

#[test]
fn push_round_robins_across_pullers() {
    let ctx = Context::new();
    let push = ctx.socket(SocketKind::Push).expect("socket");
    ctx.bind(push, "inproc://fan").expect("bind");
    let first = ctx.socket(SocketKind::Pull).expect("socket");
    let second = ctx.socket(SocketKind::Pull).expect("socket");
    ctx.connect(first, "inproc://fan").expect("connect");
    ctx.connect(second, "inproc://fan").expect("connect");

    for n in 0..4u8 {
        send_bytes(&ctx, push, &[n], Flags::NONE).expect("send");
    }
    assert_eq!(ctx.pending(first), Ok(2));
    assert_eq!(ctx.pending(second), Ok(2));
}

#[test]
fn oversized_messages_are_rejected() {
    let ctx = Context::with_config(ContextConfig {
        max_msg_size: 4,
        ..ContextConfig::default()
    });
    let (_pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://small");
    assert_eq!(send_bytes(&ctx, push, b"too big", Flags::NONE), Err(Errno::EMSGSIZE));
    send_bytes(&ctx, push, b"ok", Flags::NONE).expect("fits");
}

#[test]
fn send_shares_content_until_the_receiver_closes() {
    let ctx = Context::new();
    let (pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://share");

    static PAYLOAD: &[u8] = b"shared content";
    let freed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&freed);
    let free: FreeFn = Box::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut slot = MaybeUninit::uninit();
    let data = NonNull::new(PAYLOAD.as_ptr() as *mut u8).expect("static");
    // SAFETY: static bytes outlive every descriptor.
    unsafe { msg_init_data(&mut slot, data, PAYLOAD.len(), free) }.expect("init");
    // SAFETY: initialisation succeeded.
    let mut outgoing = unsafe { slot.assume_init() };

    ctx.send(push, &outgoing, Flags::NONE).expect("send");
    assert_eq!(bytes(&outgoing), PAYLOAD, "sender descriptor untouched");
    msg_close(&mut outgoing).expect("close sender");
    assert_eq!(freed.load(Ordering::SeqCst), 0, "queued message holds content");

    let mut incoming = empty();
    ctx.recv(pull, &mut incoming, Flags::NONE).expect("recv");
    assert_eq!(bytes(&incoming), PAYLOAD);
    msg_close(&mut incoming).expect("close receiver");
    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn recv_replaces_previous_content() {
    let ctx = Context::new();
    let (pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://replace");
    send_bytes(&ctx, push, b"fresh", Flags::NONE).expect("send");

    let mut slot = MaybeUninit::uninit();
    msg_init_size(&mut slot, 32).expect("init size");
    // SAFETY: initialisation succeeded.
    let mut msg = unsafe { slot.assume_init() };
    ctx.recv(pull, &mut msg, Flags::NONE).expect("recv");
    assert_eq!(bytes(&msg), b"fresh");
    msg_close(&mut msg).expect("close");
}

#[test]
fn blocking_recv_wakes_on_send() {
    init_logging();
    let ctx = Context::new();
    let (pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://wake");

    let receiver = {
        let ctx = ctx.clone();
        thread::spawn(move || recv_bytes(&ctx, pull, Flags::NONE))
    };
    thread::sleep(Duration::from_millis(20));
    send_bytes(&ctx, push, b"late", Flags::NONE).expect("send");
    assert_eq!(receiver.join().expect("receiver").expect("recv"), b"late");
}

#[test]
fn terminate_unblocks_waiters() {
    let ctx = Context::new();
    let pull = ctx.socket(SocketKind::Pull).expect("socket");

    let receiver = {
        let ctx = ctx.clone();
        thread::spawn(move || recv_bytes(&ctx, pull, Flags::NONE))
    };
    thread::sleep(Duration::from_millis(20));
    ctx.terminate();
    assert_eq!(receiver.join().expect("receiver"), Err(Errno::ETERM));
    ctx.close(pull).expect("close after terminate");
}

#[test]
fn randomized_payloads_survive_the_queue() {
    let ctx = Context::new();
    let (pull, push) = pair(&ctx, SocketKind::Pull, SocketKind::Push, "inproc://random");
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);

    for _ in 0..64 {
        let len = rng.gen_range(0..4096);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        send_bytes(&ctx, push, &payload, Flags::NONE).expect("send");
        assert_eq!(recv_bytes(&ctx, pull, Flags::NONE).expect("recv"), payload);
    }
}

#[test]
fn typed_option_read_back() {
    let ctx = Context::new();
    let pull = ctx.socket(SocketKind::Pull).expect("socket");
    assert_eq!(
        ctx.option(pull, OptionName::Type),
        Ok(OptionValue::Int64(i64::from(SocketKind::Pull.as_raw())))
    );
    assert_eq!(ctx.option(pull, OptionName::Hwm), Ok(OptionValue::UInt64(1000)));
    ctx.setsockopt(pull, OptionName::Identity.as_raw(), b"sink")
        .expect("identity");
    assert_eq!(
        ctx.option(pull, OptionName::Identity),
        Ok(OptionValue::Bytes(b"sink".to_vec()))
    );
    assert_eq!(ctx.setsockopt(pull, 999, b""), Err(Errno::EINVAL));
    assert_eq!(
        ctx.setsockopt(pull, OptionName::Type.as_raw(), &OptionValue::Int64(0).encode()),
        Err(Errno::EINVAL)
    );
    assert!(transport::version() >= (0, 1, 0));
}
