use super::clusters::IdentifyControl;
use super::device_info::{comm_data, device_info};
use super::handler::SensorNodeHandler;
use super::lifecycle::{CommissioningTracker, run_lifecycle_monitor};
use super::logging_udp::LoggingUdpSocket;
use super::netif::{FilteredNetifs, InterfaceSnapshot, resolve_interface, scan_interface};
use super::node::NodeModel;
use super::notifier::ClusterNotifier;
use crate::callbacks::DeviceEventListener;
use crate::config::MatterConfig;
use crate::onboarding::OnboardingInfo;
use embassy_futures::select::{select, select3, select4};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use log::{error, info, warn};
use rs_matter::dm::IMBuffer;
use rs_matter::dm::clusters::desc::{self, ClusterHandler as _};
use rs_matter::dm::devices::test::TEST_DEV_ATT;
use rs_matter::dm::endpoints;
use rs_matter::dm::subscriptions::DefaultSubscriptions;
use rs_matter::dm::{
    Async, AsyncHandler, AsyncMetadata, DataModel, Dataver, EmptyHandler, EpClMatcher, Handler,
    Node,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::pairing::DiscoveryCapabilities;
use rs_matter::pairing::qr::QrTextType;
use rs_matter::persist::{NO_NETWORKS, Psm};
use rs_matter::respond::DefaultResponder;
use rs_matter::transport::network::mdns::builtin::{BuiltinMdnsResponder, Host};
use rs_matter::transport::network::mdns::{
    MDNS_IPV4_BROADCAST_ADDR, MDNS_IPV6_BROADCAST_ADDR, MDNS_SOCKET_DEFAULT_BIND_ADDR,
};
use rs_matter::utils::init::InitMaybeUninit;
use rs_matter::utils::select::Coalesce;
use rs_matter::utils::storage::pooled::PooledBuffers;
use rs_matter::{MATTER_PORT, Matter};
use socket2::{Domain, Protocol, Socket, Type};
use static_cell::StaticCell;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::pin::pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Static cells for Matter resources (required for 'static lifetime)
static MATTER: StaticCell<Matter> = StaticCell::new();
static BUFFERS: StaticCell<PooledBuffers<10, NoopRawMutex, IMBuffer>> = StaticCell::new();
static SUBSCRIPTIONS: StaticCell<DefaultSubscriptions> = StaticCell::new();
static PSM: StaticCell<Psm<4096>> = StaticCell::new();

/// Static hostname storage for mDNS (needs 'static lifetime for Host struct)
static HOSTNAME: OnceLock<String> = OnceLock::new();
/// Network interface filter for General Diagnostics
static NETIFS: OnceLock<FilteredNetifs> = OnceLock::new();

/// How long the basic commissioning window stays open
const COMM_WINDOW_TIMEOUT_SECS: u16 = 900;

/// Everything the stack needs from the bootstrapped node.
pub struct StackContext {
    pub config: MatterConfig,
    pub model: Arc<NodeModel>,
    pub identify: Arc<IdentifyControl>,
    pub events: Arc<dyn DeviceEventListener>,
    /// Clusters changed by the attribute system since the last report
    pub changes: Arc<ClusterNotifier>,
    /// Where the fabric state lives; `None` keeps it in memory only
    pub persist_path: Option<PathBuf>,
}

fn netifs(interface_name: String) -> &'static FilteredNetifs {
    NETIFS.get_or_init(|| FilteredNetifs::new(Box::leak(interface_name.into_boxed_str())))
}

/// Build the data model handler: root endpoint clusters plus the sensor endpoints
fn dm_handler<'a, D: Handler + 'a>(
    matter: &'a Matter<'a>,
    node: Node<'static>,
    netifs: &'a FilteredNetifs,
    sensors: &'a SensorNodeHandler<D>,
) -> impl AsyncMetadata + AsyncHandler + 'a {
    (
        node,
        endpoints::with_eth(
            &(),
            netifs,
            matter.rand(),
            endpoints::with_sys(
                &false,
                matter.rand(),
                // Root endpoint handlers are chained on top and match first
                EmptyHandler.chain(EpClMatcher::new(None, None), Async(sensors)),
            ),
        ),
    )
}

fn udp_socket(bind_addr: SocketAddr, code: ErrorCode) -> Result<Socket, Error> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| {
        error!("Failed to create UDP socket: {}", e);
        code
    })?;
    socket.set_reuse_address(true).map_err(|e| {
        error!("Failed to set SO_REUSEADDR: {}", e);
        code
    })?;
    socket.set_only_v6(false).map_err(|e| {
        error!("Failed to set IPV6_V6ONLY=false: {}", e);
        code
    })?;
    socket.set_nonblocking(true).map_err(|e| {
        error!("Failed to set non-blocking: {}", e);
        code
    })?;
    socket.bind(&bind_addr.into()).map_err(|e| {
        error!("Failed to bind UDP socket to {:?}: {}", bind_addr, e);
        code
    })?;
    Ok(socket)
}

/// Tell the subscription engine about every cluster the attribute system changed.
async fn report_changes(
    changes: &ClusterNotifier,
    subscriptions: &DefaultSubscriptions,
) -> Result<(), Error> {
    loop {
        changes.wait().await;
        for (endpoint_id, cluster_id) in changes.take_pending() {
            subscriptions.notify_cluster_changed(endpoint_id, cluster_id);
        }
    }
}

/// Pick the interface and make sure it can carry Matter traffic.
fn select_interface(config: &MatterConfig) -> Result<(&'static FilteredNetifs, InterfaceSnapshot), Error> {
    let netifs = netifs(resolve_interface(config.interface.as_deref())?);
    let name = netifs.interface_name();

    let snapshot = scan_interface(name).ok_or_else(|| {
        error!("Network interface '{}' not found", name);
        Error::from(ErrorCode::NoNetworkInterface)
    })?;

    if snapshot.ipv4.is_empty() {
        error!("No IPv4 address found on interface '{}'", name);
        return Err(ErrorCode::MdnsError.into());
    }

    Ok((netifs, snapshot))
}

/// Run the Matter stack for the sensor node.
///
/// Opens the commissioning window when the node has no fabric yet and runs
/// transport, mDNS, the interaction model, persistence and the lifecycle
/// monitor until one of them fails.
pub async fn run_matter_stack(ctx: StackContext) -> Result<(), Error> {
    info!("Initializing Matter stack...");

    let matter = MATTER.uninit().init_with(Matter::init(
        device_info(&ctx.config),
        comm_data(&ctx.config),
        &TEST_DEV_ATT,
        rs_matter::utils::epoch::sys_epoch,
        rs_matter::utils::rand::sys_rand,
        MATTER_PORT,
    ));

    matter.initialize_transport_buffers()?;

    // Bind to the IPv6 address advertised over mDNS so replies leave from it
    let (netifs, snapshot) = select_interface(&ctx.config)?;
    let ipv4_addr = snapshot.ipv4[0];
    let ipv6_addr = snapshot.ipv6.first().copied().unwrap_or_else(|| {
        info!(
            "No global IPv6 address on '{}', using unspecified",
            snapshot.name
        );
        Ipv6Addr::UNSPECIFIED
    });

    info!(
        "Using interface '{}' (index {}) with {} and {}",
        snapshot.name, snapshot.index, ipv4_addr, ipv6_addr
    );

    let bind_addr = SocketAddr::new(IpAddr::V6(ipv6_addr), MATTER_PORT);
    let socket = async_io::Async::<UdpSocket>::new(
        udp_socket(bind_addr, ErrorCode::StdIoError)?.into(),
    )
    .map_err(|e| {
        error!("Failed to create async socket: {}", e);
        ErrorCode::StdIoError
    })?;
    info!("Matter UDP socket bound to {:?}", bind_addr);

    let psm = PSM.uninit().init_with(Psm::init());
    match &ctx.persist_path {
        Some(path) => {
            if let Err(e) = psm.load(path, matter, NO_NETWORKS) {
                // Start fresh
                error!("Failed to load persisted state from {:?}: {:?}", path, e);
            }
        }
        None => warn!("No persistent storage, fabrics will be lost on restart"),
    }

    let mut commissioning = CommissioningTracker::new(matter.is_commissioned());
    if matter.is_commissioned() {
        info!("Device already commissioned, skipping commissioning window");
    } else {
        info!(
            "Opening commissioning window for {} seconds...",
            COMM_WINDOW_TIMEOUT_SECS
        );
        matter.open_basic_comm_window(COMM_WINDOW_TIMEOUT_SECS)?;
        ctx.events.on_device_event(commissioning.window_opened(
            Instant::now(),
            Duration::from_secs(COMM_WINDOW_TIMEOUT_SECS as u64),
        ));

        let onboarding = OnboardingInfo::from_config(&ctx.config);
        info!("Matter device ready for commissioning");
        info!("  Manual pairing code: {}", onboarding.formatted_code());
        info!("  Discriminator: {}", onboarding.discriminator);
        info!("  Passcode: {}", onboarding.passcode);

        if let Err(e) = matter.print_standard_qr_text(DiscoveryCapabilities::IP) {
            error!("Failed to print QR text: {:?}", e);
        }

        if let Err(e) =
            matter.print_standard_qr_code(QrTextType::Unicode, DiscoveryCapabilities::IP)
        {
            error!("Failed to print QR code: {:?}", e);
        }
    }

    let buffers = BUFFERS.uninit().init_with(PooledBuffers::init(0));
    let subscriptions: &DefaultSubscriptions = SUBSCRIPTIONS
        .uninit()
        .init_with(DefaultSubscriptions::init());

    // Randomized Dataver seeds so controllers notice changes across restarts
    let sensors = SensorNodeHandler::new(
        desc::DescHandler::new(Dataver::new_rand(matter.rand())).adapt(),
        &ctx.model,
        &ctx.identify,
        || Dataver::new_rand(matter.rand()),
    );

    let handler = dm_handler(matter, ctx.model.matter_node(), netifs, &sensors);
    let dm = DataModel::new(matter, buffers, subscriptions, handler);
    let responder = DefaultResponder::new(&dm);

    info!("Matter stack running. Waiting for controller connections...");

    let logging_socket = LoggingUdpSocket::new(&socket);
    let mut transport = pin!(matter.run(&logging_socket, &logging_socket));

    // mDNS uses its own socket on port 5353
    let mdns_socket = udp_socket(MDNS_SOCKET_DEFAULT_BIND_ADDR, ErrorCode::MdnsError)?;
    let mdns_socket =
        async_io::Async::<UdpSocket>::new_nonblocking(mdns_socket.into()).map_err(|e| {
            error!("Failed to create async mDNS socket: {}", e);
            ErrorCode::MdnsError
        })?;

    mdns_socket
        .get_ref()
        .join_multicast_v6(&MDNS_IPV6_BROADCAST_ADDR, snapshot.index)
        .map_err(|e| {
            error!("Failed to join IPv6 multicast group: {}", e);
            ErrorCode::MdnsError
        })?;
    mdns_socket
        .get_ref()
        .join_multicast_v4(&MDNS_IPV4_BROADCAST_ADDR, &ipv4_addr)
        .map_err(|e| {
            error!("Failed to join IPv4 multicast group: {}", e);
            ErrorCode::MdnsError
        })?;

    info!("mDNS socket bound to {:?}", MDNS_SOCKET_DEFAULT_BIND_ADDR);

    let hostname =
        HOSTNAME.get_or_init(|| gethostname::gethostname().to_string_lossy().into_owned());

    let host = Host {
        id: 0,
        hostname,
        ip: ipv4_addr.octets().into(),
        ipv6: ipv6_addr.octets().into(),
    };

    let mdns_responder = BuiltinMdnsResponder::new(matter);
    let mut mdns = pin!(mdns_responder.run(
        &mdns_socket,
        &mdns_socket,
        &host,
        Some(ipv4_addr.octets().into()),
        Some(snapshot.index),
    ));

    let mut respond = pin!(responder.run::<4, 4>());
    let mut dm_job = pin!(dm.run());

    let mut persist = pin!(async {
        match &ctx.persist_path {
            Some(path) => psm.run(path, matter, NO_NETWORKS).await,
            None => core::future::pending().await,
        }
    });

    let mut lifecycle = pin!(run_lifecycle_monitor(
        matter,
        commissioning,
        netifs.interface_name(),
        &*ctx.events,
        &ctx.identify,
    ));

    let mut changes = pin!(report_changes(&ctx.changes, subscriptions));

    // Everything runs in one executor; Matter's internal state is not Sync
    let result = select4(
        &mut transport,
        &mut mdns,
        select(&mut respond, &mut dm_job).coalesce(),
        select3(&mut persist, &mut lifecycle, &mut changes).coalesce(),
    )
    .coalesce()
    .await;

    if let Err(e) = result {
        error!("Matter stack error: {:?}", e);
        return Err(e);
    }

    Ok(())
}
