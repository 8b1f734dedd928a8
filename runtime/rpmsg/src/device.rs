//! Queue pair plus endpoint table

use core::fmt;

use duet_platform::{SwIntrHandlers, SwIntrId};
use duet_queue::{Queue, QueueConfig, QueueError, QueueHooks, Role};
use duet_sysinfo::{reserved, SysInfo};

use crate::endpoint::{Endpoint, EndpointHandler, EndpointTable};
use crate::message::{MessageFlags, RxMessage, TxMessage, HEADER_SIZE};
use crate::{Result, RpmsgConfig, RpmsgError, DEFAULT_ENDPOINTS};

/// One core's end of the transport
///
/// Holds the sending (master) and receiving (remote) queue and up to `N`
/// endpoint bindings.
pub struct Rpmsg<'a, const N: usize = DEFAULT_ENDPOINTS> {
    tx: Queue<'a>,
    rx: Queue<'a>,
    endpoints: EndpointTable<'a, N>,
}

impl<'a, const N: usize> Rpmsg<'a, N> {
    /// Create both queues and attach to them
    ///
    /// Main core. Notify hooks only fire on the sending queue.
    pub fn main_init(sysinfo: &SysInfo<'a>, cfg: &RpmsgConfig, hooks: QueueHooks<'a>) -> Result<Self> {
        let tx_cfg = QueueConfig::new(reserved::VQUEUE_MAIN, cfg.queue_len, cfg.item_size, Role::Master)
            .with_desc_pool(cfg.desc_pool);
        let rx_cfg = QueueConfig::new(reserved::VQUEUE_SUB, cfg.queue_len, cfg.item_size, Role::Remote);

        let tx = Queue::main_init(sysinfo, &tx_cfg, hooks)?;
        let rx = Queue::main_init(sysinfo, &rx_cfg, hooks.without_notify())?;
        Self::from_queues(tx, rx)
    }

    /// Attach to the queues the main core published
    ///
    /// # Errors
    /// A transient [`RpmsgError::Queue`] until the main core has finished
    /// [`main_init`](Self::main_init).
    pub fn sub_init(sysinfo: &SysInfo<'a>, hooks: QueueHooks<'a>) -> Result<Self> {
        let tx = Queue::sub_init(sysinfo, reserved::VQUEUE_SUB, Role::Master, hooks)?;
        let rx = Queue::sub_init(sysinfo, reserved::VQUEUE_MAIN, Role::Remote, hooks.without_notify())?;
        Self::from_queues(tx, rx)
    }

    /// Build a transport over two already attached queues
    pub fn from_queues(tx: Queue<'a>, rx: Queue<'a>) -> Result<Self> {
        if tx.role() != Role::Master || rx.role() != Role::Remote {
            return Err(RpmsgError::InvalidArg("tx must be the master side and rx the remote side"));
        }
        if tx.max_item_size() < HEADER_SIZE {
            return Err(RpmsgError::InvalidArg("item size smaller than the envelope"));
        }
        Ok(Self {
            tx,
            rx,
            endpoints: EndpointTable::new(),
        })
    }

    /// Bind `handler` at `addr`
    ///
    /// # Errors
    /// - [`RpmsgError::AlreadyBound`] if `addr` is taken
    /// - [`RpmsgError::TableFull`] if all `N` slots are used
    pub fn create_endpoint(&mut self, addr: u16, handler: &'a dyn EndpointHandler<'a>) -> Result<Endpoint> {
        let ept = self.endpoints.bind(addr, handler)?;
        log::debug!("rpmsg: endpoint {:#06x} bound", addr);
        Ok(ept)
    }

    pub fn delete_endpoint(&mut self, ept: Endpoint) -> Result<()> {
        self.endpoints.unbind(ept.addr())?;
        log::debug!("rpmsg: endpoint {:#06x} released", ept.addr());
        Ok(())
    }

    pub fn is_bound(&self, addr: u16) -> bool {
        self.endpoints.lookup(addr).is_some()
    }

    /// Number of bound endpoints
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Run `handler` whenever the peer publishes a message for this core
    ///
    /// `line` must be the one the peer's notify hook raises. The handler
    /// typically calls [`poll`](Self::poll) or wakes the task that does.
    ///
    /// # Errors
    /// A [`RpmsgError::Queue`] if `line` already has a handler.
    pub fn intr_enable<'h>(
        &self,
        intr: &dyn SwIntrHandlers<'h>,
        line: SwIntrId,
        handler: &'h dyn Fn(),
    ) -> Result<()> {
        self.rx.intr_enable(intr, line, handler)?;
        Ok(())
    }

    /// Send and release handle, the same one handlers receive
    pub fn io(&mut self) -> RpmsgIo<'_, 'a> {
        RpmsgIo {
            tx: &mut self.tx,
            rx: &mut self.rx,
        }
    }

    /// See [`RpmsgIo::create_message`]
    pub fn create_message(&mut self, len: u16, flags: MessageFlags) -> Result<TxMessage<'a>> {
        self.io().create_message(len, flags)
    }

    /// See [`RpmsgIo::send_nocopy`]
    pub fn send_nocopy(&mut self, ept: &Endpoint, dst: u16, msg: TxMessage<'a>, len: u16) -> Result<()> {
        self.io().send_nocopy(ept, dst, msg, len)
    }

    /// See [`RpmsgIo::send`]
    pub fn send(&mut self, ept: &Endpoint, dst: u16, data: &[u8]) -> Result<()> {
        self.io().send(ept, dst, data)
    }

    /// See [`RpmsgIo::destroy`]
    pub fn destroy(&mut self, msg: RxMessage<'a>) -> Result<()> {
        self.io().destroy(msg)
    }

    /// Largest payload one message can carry
    pub fn max_payload_size(&self) -> u16 {
        self.tx.max_item_size().saturating_sub(HEADER_SIZE)
    }

    /// Drain the receive queue, dispatching every message
    ///
    /// Returns the number of messages taken off the ring, including
    /// malformed and unaddressed ones.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;
        loop {
            let buf = match self.rx.recv_try() {
                Ok(buf) => buf,
                Err(QueueError::NotFound) => break,
                Err(e) => {
                    log::error!("rpmsg: receive failed: {}", e);
                    break;
                }
            };
            count += 1;

            let mut io = RpmsgIo {
                tx: &mut self.tx,
                rx: &mut self.rx,
            };
            let msg = match RxMessage::parse(buf) {
                Ok(msg) => msg,
                Err(buf) => {
                    log::warn!("rpmsg: dropping malformed message at {:#x}", buf.offset());
                    if let Err(e) = io.rx.free_try(buf) {
                        log::error!("rpmsg: release failed: {}", e);
                    }
                    continue;
                }
            };

            let leftover = match self.endpoints.lookup(msg.dst()) {
                Some(handler) => handler.on_message(&mut io, msg),
                None => {
                    log::debug!("rpmsg: no endpoint at {:#06x}, dropping message from {:#06x}", msg.dst(), msg.src());
                    Some(msg)
                }
            };
            if let Some(msg) = leftover {
                if let Err(e) = io.destroy(msg) {
                    log::error!("rpmsg: release failed: {}", e);
                }
            }
        }
        count
    }
}

impl<const N: usize> fmt::Debug for Rpmsg<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpmsg")
            .field("tx", &self.tx)
            .field("rx", &self.rx)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

/// Borrowed queue pair for sending and releasing messages
pub struct RpmsgIo<'r, 'a> {
    tx: &'r mut Queue<'a>,
    rx: &'r mut Queue<'a>,
}

impl<'a> RpmsgIo<'_, 'a> {
    /// Take a send buffer with room for `len` payload bytes
    ///
    /// # Errors
    /// - [`RpmsgError::NoMem`] if `len` plus the envelope exceeds the item size
    /// - [`RpmsgError::Queue`] with [`QueueError::NotFound`] if every buffer
    ///   is in flight (transient)
    pub fn create_message(&mut self, len: u16, flags: MessageFlags) -> Result<TxMessage<'a>> {
        let max = self.tx.max_item_size();
        let total = len
            .checked_add(HEADER_SIZE)
            .filter(|total| *total <= max)
            .ok_or(RpmsgError::NoMem {
                requested: len as usize + HEADER_SIZE as usize,
                max,
            })?;
        let buf = self.tx.alloc_try(total)?;
        Ok(TxMessage::new(buf, flags))
    }

    /// Send the first `len` payload bytes of `msg` from `ept` to `dst`
    ///
    /// `msg` must be the oldest message created and not yet sent.
    pub fn send_nocopy(&mut self, ept: &Endpoint, dst: u16, msg: TxMessage<'a>, len: u16) -> Result<()> {
        if len as usize > msg.capacity() {
            return Err(RpmsgError::InvalidArg("length exceeds the created message"));
        }
        let buf = msg.seal(ept.addr(), dst, len);
        self.tx.send_try(buf, HEADER_SIZE + len)?;
        Ok(())
    }

    /// Copy `data` into a new message and send it
    pub fn send(&mut self, ept: &Endpoint, dst: u16, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| RpmsgError::NoMem {
            requested: data.len() + HEADER_SIZE as usize,
            max: self.tx.max_item_size(),
        })?;
        let mut msg = self.create_message(len, MessageFlags::empty())?;
        msg.copy_from_slice(data);
        self.send_nocopy(ept, dst, msg, len)
    }

    /// Hand a received message back to the sender
    pub fn destroy(&mut self, msg: RxMessage<'a>) -> Result<()> {
        self.rx.free_try(msg.into_buf())?;
        Ok(())
    }

    pub fn max_payload_size(&self) -> u16 {
        self.tx.max_item_size().saturating_sub(HEADER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use duet_platform::SharedRegion;
    use duet_sysinfo::Pool;
    use std::vec::Vec;

    const SERVICE: u16 = 0x20;
    const CLIENT: u16 = 0x40;

    fn setup(hp: &SharedRegion) -> SysInfo<'_> {
        let sysinfo = SysInfo::new(hp, None);
        sysinfo.init_all().unwrap();
        sysinfo
    }

    fn pair<'a, const N: usize>(sysinfo: &SysInfo<'a>, cfg: &RpmsgConfig) -> (Rpmsg<'a, N>, Rpmsg<'a, N>) {
        let main = Rpmsg::main_init(sysinfo, cfg, QueueHooks::new()).unwrap();
        let sub = Rpmsg::sub_init(sysinfo, QueueHooks::new()).unwrap();
        (main, sub)
    }

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<(u16, u16, Vec<u8>)>>,
    }

    impl<'a> EndpointHandler<'a> for Recorder {
        fn on_message(&self, _io: &mut RpmsgIo<'_, 'a>, msg: RxMessage<'a>) -> Option<RxMessage<'a>> {
            self.seen.borrow_mut().push((msg.src(), msg.dst(), msg.to_vec()));
            Some(msg)
        }
    }

    struct Echo;

    impl<'a> EndpointHandler<'a> for Echo {
        fn on_message(&self, io: &mut RpmsgIo<'_, 'a>, msg: RxMessage<'a>) -> Option<RxMessage<'a>> {
            io.send(&msg.endpoint(), msg.src(), &msg).unwrap();
            Some(msg)
        }
    }

    #[derive(Default)]
    struct Keeper<'a> {
        kept: RefCell<Vec<RxMessage<'a>>>,
        calls: Cell<usize>,
    }

    impl<'a> EndpointHandler<'a> for Keeper<'a> {
        fn on_message(&self, _io: &mut RpmsgIo<'_, 'a>, msg: RxMessage<'a>) -> Option<RxMessage<'a>> {
            self.calls.set(self.calls.get() + 1);
            self.kept.borrow_mut().push(msg);
            None
        }
    }

    #[test]
    fn test_endpoint_binding() {
        let recorder = Recorder::default();
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let (mut main, _sub) = pair::<2>(&sysinfo, &RpmsgConfig::new(4, 32));

        let a = main.create_endpoint(1, &recorder).unwrap();
        assert_eq!(a.addr(), 1);
        assert_eq!(main.create_endpoint(1, &recorder), Err(RpmsgError::AlreadyBound(1)));
        main.create_endpoint(2, &recorder).unwrap();
        assert_eq!(main.create_endpoint(3, &recorder), Err(RpmsgError::TableFull(2)));

        main.delete_endpoint(a).unwrap();
        assert!(!main.is_bound(1));
        assert_eq!(main.delete_endpoint(a), Err(RpmsgError::NotBound(1)));
        main.create_endpoint(3, &recorder).unwrap();
        assert_eq!(main.endpoint_count(), 2);
    }

    #[test]
    fn test_send_and_dispatch() {
        let recorder = Recorder::default();
        let hp = SharedRegion::arena(16 * 1024);
        let sysinfo = setup(&hp);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::default());

        let client = main.create_endpoint(CLIENT, &recorder).unwrap();
        let service = sub.create_endpoint(SERVICE, &recorder).unwrap();

        main.send(&client, SERVICE, b"ping").unwrap();
        main.send(&client, SERVICE, b"").unwrap();
        assert_eq!(sub.poll(), 2);
        sub.send(&service, CLIENT, b"pong").unwrap();
        assert_eq!(main.poll(), 1);
        assert_eq!(main.poll(), 0);

        let seen = recorder.seen.borrow();
        assert_eq!(seen[0], (CLIENT, SERVICE, b"ping".to_vec()));
        assert_eq!(seen[1], (CLIENT, SERVICE, Vec::new()));
        assert_eq!(seen[2], (SERVICE, CLIENT, b"pong".to_vec()));
    }

    #[test]
    fn test_receive_interrupt_drives_poll() {
        use duet_platform::mock::MockLink;
        use duet_platform::{CoreId, SwIntrNotify};

        let recorder = Recorder::default();
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let link = MockLink::new();
        let main_core = link.core(CoreId::Main);
        let notify = SwIntrNotify::new(&main_core, SwIntrId::Id0);
        let hooks = QueueHooks::new().notify(&notify);
        let mut main: Rpmsg<'_> = Rpmsg::main_init(&sysinfo, &RpmsgConfig::new(4, 32), hooks).unwrap();
        let sub: RefCell<Rpmsg<'_>> = RefCell::new(Rpmsg::sub_init(&sysinfo, QueueHooks::new()).unwrap());
        let drained = Cell::new(0);
        let on_rx = || drained.set(drained.get() + sub.borrow_mut().poll());
        let sub_core = link.core(CoreId::Sub);

        let client = main.create_endpoint(CLIENT, &recorder).unwrap();
        sub.borrow_mut().create_endpoint(SERVICE, &recorder).unwrap();
        sub.borrow().intr_enable(&sub_core, SwIntrId::Id0, &on_rx).unwrap();
        assert!(matches!(
            sub.borrow().intr_enable(&sub_core, SwIntrId::Id0, &on_rx),
            Err(RpmsgError::Queue(QueueError::Signal(_)))
        ));

        main.send(&client, SERVICE, b"one").unwrap();
        main.send(&client, SERVICE, b"two").unwrap();
        assert_eq!(drained.get(), 0);
        assert_eq!(sub_core.dispatch(), 1);
        assert_eq!(drained.get(), 2);
        assert_eq!(sub_core.dispatch(), 0);

        let seen = recorder.seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (CLIENT, SERVICE, b"two".to_vec()));
    }

    #[test]
    fn test_retention_pool_holds_only_tx_descriptors() {
        let recorder = Recorder::default();
        let hp = SharedRegion::arena(4096);
        let rtc = SharedRegion::arena(256);
        let sysinfo = SysInfo::new(&hp, Some(&rtc));
        sysinfo.init_all().unwrap();

        let cfg = RpmsgConfig::new(4, 32).with_desc_pool(Pool::Rtc);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &cfg);
        assert_eq!(sysinfo.get(reserved::VQUEUE_MAIN, Pool::Rtc).unwrap().size, 4 * 8);
        assert!(sysinfo.get(reserved::VQUEUE_SUB, Pool::Rtc).is_err());

        let ept = main.create_endpoint(CLIENT, &recorder).unwrap();
        sub.create_endpoint(SERVICE, &Echo).unwrap();
        main.send(&ept, SERVICE, b"hi").unwrap();
        assert_eq!(sub.poll(), 1);
        assert_eq!(main.poll(), 1);
        assert_eq!(recorder.seen.borrow()[0], (SERVICE, CLIENT, b"hi".to_vec()));
    }

    #[test]
    fn test_nocopy_partial_send() {
        let recorder = Recorder::default();
        let hp = SharedRegion::arena(16 * 1024);
        let sysinfo = setup(&hp);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::default());
        let client = main.create_endpoint(CLIENT, &recorder).unwrap();
        sub.create_endpoint(SERVICE, &recorder).unwrap();

        let mut msg = main.create_message(16, MessageFlags::ZERO_FILL).unwrap();
        assert_eq!(msg.capacity(), 16);
        assert!(msg.iter().all(|b| *b == 0));
        msg[..3].copy_from_slice(b"abc");
        main.send_nocopy(&client, SERVICE, msg, 3).unwrap();

        sub.poll();
        assert_eq!(recorder.seen.borrow()[0].2, b"abc".to_vec());
    }

    #[test]
    fn test_send_longer_than_created() {
        let hp = SharedRegion::arena(16 * 1024);
        let sysinfo = setup(&hp);
        let (mut main, _sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::default());
        let recorder = Recorder::default();
        let ept = main.create_endpoint(CLIENT, &recorder).unwrap();

        let msg = main.create_message(4, MessageFlags::empty()).unwrap();
        assert!(matches!(
            main.send_nocopy(&ept, SERVICE, msg, 5),
            Err(RpmsgError::InvalidArg(_))
        ));
    }

    #[test]
    fn test_message_size_limits() {
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let (mut main, _sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::new(4, 32));

        assert_eq!(main.max_payload_size(), 24);
        assert_eq!(
            main.create_message(25, MessageFlags::empty()).unwrap_err(),
            RpmsgError::NoMem { requested: 33, max: 32 }
        );
        assert!(matches!(
            main.create_message(u16::MAX, MessageFlags::empty()),
            Err(RpmsgError::NoMem { .. })
        ));
        let msg = main.create_message(24, MessageFlags::empty()).unwrap();
        assert_eq!(msg.capacity(), 24);
    }

    #[test]
    fn test_exhaustion_is_transient() {
        let recorder = Recorder::default();
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::new(4, 32));
        let client = main.create_endpoint(CLIENT, &recorder).unwrap();
        sub.create_endpoint(SERVICE, &recorder).unwrap();

        for i in 0..4u8 {
            main.send(&client, SERVICE, &[i]).unwrap();
        }
        let err = main.send(&client, SERVICE, &[9]).unwrap_err();
        assert_eq!(err, RpmsgError::Queue(QueueError::NotFound));
        assert!(err.is_transient());

        assert_eq!(sub.poll(), 4);
        main.send(&client, SERVICE, &[9]).unwrap();
        assert_eq!(sub.poll(), 1);
        assert_eq!(recorder.seen.borrow().len(), 5);
    }

    #[test]
    fn test_unaddressed_messages_are_released() {
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::new(2, 32));
        let recorder = Recorder::default();
        let client = main.create_endpoint(CLIENT, &recorder).unwrap();

        for round in 0..6u8 {
            main.send(&client, 0x7777, &[round]).unwrap();
            main.send(&client, 0x7778, &[round]).unwrap();
            assert_eq!(sub.poll(), 2);
        }
        assert!(recorder.seen.borrow().is_empty());
    }

    #[test]
    fn test_reply_from_handler() {
        let recorder = Recorder::default();
        let echo = Echo;
        let hp = SharedRegion::arena(16 * 1024);
        let sysinfo = setup(&hp);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::default());
        let client = main.create_endpoint(CLIENT, &recorder).unwrap();
        sub.create_endpoint(SERVICE, &echo).unwrap();

        for i in 0..10u8 {
            main.send(&client, SERVICE, &[i, i + 1]).unwrap();
            assert_eq!(sub.poll(), 1);
            assert_eq!(main.poll(), 1);
        }
        let seen = recorder.seen.borrow();
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[7], (SERVICE, CLIENT, std::vec![7, 8]));
    }

    #[test]
    fn test_kept_message_destroyed_later() {
        let recorder = Recorder::default();
        let keeper = Keeper::default();
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let (mut main, mut sub): (Rpmsg<'_>, Rpmsg<'_>) = pair(&sysinfo, &RpmsgConfig::new(2, 32));
        let client = main.create_endpoint(CLIENT, &recorder).unwrap();
        sub.create_endpoint(SERVICE, &keeper).unwrap();

        main.send(&client, SERVICE, b"one").unwrap();
        main.send(&client, SERVICE, b"two").unwrap();
        assert_eq!(sub.poll(), 2);
        assert_eq!(keeper.calls.get(), 2);
        assert!(main.send(&client, SERVICE, b"three").unwrap_err().is_transient());

        let kept: Vec<RxMessage<'_>> = keeper.kept.borrow_mut().drain(..).collect();
        assert_eq!(&kept[1][..], b"two");
        for msg in kept {
            sub.destroy(msg).unwrap();
        }
        main.send(&client, SERVICE, b"three").unwrap();
        assert_eq!(sub.poll(), 1);
    }

    #[test]
    fn test_malformed_envelope_dropped() {
        let recorder = Recorder::default();
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let mut raw = Queue::main_init(
            &sysinfo,
            &QueueConfig::new(reserved::VQUEUE_MAIN, 4, 32, Role::Master),
            QueueHooks::new(),
        )
        .unwrap();
        Queue::main_init(
            &sysinfo,
            &QueueConfig::new(reserved::VQUEUE_SUB, 4, 32, Role::Remote),
            QueueHooks::new(),
        )
        .unwrap();
        let mut sub: Rpmsg<'_> = Rpmsg::sub_init(&sysinfo, QueueHooks::new()).unwrap();
        sub.create_endpoint(SERVICE, &recorder).unwrap();

        // shorter than an envelope
        let buf = raw.alloc_try(4).unwrap();
        raw.send_try(buf, 4).unwrap();
        // declared payload longer than the buffer
        let mut buf = raw.alloc_try(12).unwrap();
        buf.copy_from_slice(&[0, 0, SERVICE as u8, 0, 20, 0, 0, 0, 1, 2, 3, 4]);
        raw.send_try(buf, 12).unwrap();

        assert_eq!(sub.poll(), 2);
        assert!(recorder.seen.borrow().is_empty());
        for _ in 0..4 {
            let buf = raw.alloc_try(8).unwrap();
            raw.send_try(buf, 8).unwrap();
        }
    }

    #[test]
    fn test_sub_before_main() {
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let attached: Result<Rpmsg<'_>> = Rpmsg::sub_init(&sysinfo, QueueHooks::new());
        assert!(attached.unwrap_err().is_transient());
    }

    #[test]
    fn test_item_smaller_than_envelope() {
        let hp = SharedRegion::arena(4096);
        let sysinfo = setup(&hp);
        let created: Result<Rpmsg<'_>> = Rpmsg::main_init(&sysinfo, &RpmsgConfig::new(4, 4), QueueHooks::new());
        assert!(matches!(created, Err(RpmsgError::InvalidArg(_))));
    }
}
