#![cfg_attr(target_arch = "riscv32", no_std)]
#![cfg_attr(target_arch = "riscv32", no_main)]

// Firmware drivers only build for the ESP32-C3; the host build gets a stub
#[cfg(target_arch = "riscv32")]
mod mqtt_client;
#[cfg(target_arch = "riscv32")]
mod wifi;

#[cfg(not(target_arch = "riscv32"))]
fn main() {
    eprintln!("envdisplay-rs is ESP32-C3 firmware; build it with:");
    eprintln!("  cargo build --release --target riscv32imc-unknown-none-elf");
    eprintln!("Host tests: cargo test --lib --tests --target x86_64-unknown-linux-gnu");
}

#[cfg(target_arch = "riscv32")]
use {
    core::cell::RefCell,
    embassy_net::tcp::TcpSocket,
    embassy_net::{Config, IpAddress, IpEndpoint, Ipv4Address, Runner, Stack, StackResources},
    embassy_time::{Instant, Timer},
    esp_hal::clock::CpuClock,
    esp_hal::rmt::Rmt,
    esp_hal::rng::Rng,
    esp_hal::time::Rate,
    esp_hal::timer::timg::TimerGroup,
    esp_hal_embassy::Executor,
    esp_hal_smartled::{SmartLedsAdapter, smart_led_buffer},
    esp_println::println,
    esp_wifi::wifi::WifiDevice,
    log::{LevelFilter, info, warn},
    static_cell::StaticCell,
};

#[cfg(target_arch = "riscv32")]
use envdisplay_rs::{
    BoardError, Indicator,
    config::{self, IndicatorConfig},
    topics::{DeviceId, make_device_id},
};

#[cfg(target_arch = "riscv32")]
use crate::{
    mqtt_client::{BrokerClient, MQTT_PACKET_SIZE},
    wifi::WiFiManager,
};

// Add app descriptor for espflash compatibility
#[cfg(target_arch = "riscv32")]
esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(target_arch = "riscv32")]
type LedStrip =
    SmartLedsAdapter<esp_hal::rmt::Channel<esp_hal::Blocking, 0>, { config::MAX_PIXELS * 24 + 1 }>;

#[cfg(target_arch = "riscv32")]
type BoardIndicator = Indicator<BrokerClient<'static>, LedStrip>;

// Static cells for embassy components
#[cfg(target_arch = "riscv32")]
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static SOCKET_RX: StaticCell<[u8; 1024]> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static SOCKET_TX: StaticCell<[u8; 512]> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static SOCKET: StaticCell<RefCell<TcpSocket<'static>>> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static MQTT_RX: StaticCell<[u8; MQTT_PACKET_SIZE]> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static MQTT_TX: StaticCell<[u8; MQTT_PACKET_SIZE]> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static DEVICE_ID: StaticCell<DeviceId> = StaticCell::new();
#[cfg(target_arch = "riscv32")]
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[cfg(target_arch = "riscv32")]
fn print_banner(config: &IndicatorConfig) {
    println!("========================================");
    println!("  {} v{}", config::FIRMWARE_NAME, config::FIRMWARE_VERSION);
    println!("  {}", config::FIRMWARE_SLUG);
    println!("========================================");
    if let Ok(device_id) = make_device_id(config.device_type, config.client_id) {
        println!("[MAIN] Device id: {}", device_id);
    }
    println!("[MAIN] Broker: {}:{}", config.broker(), config::MQTT_PORT);
    println!("[MAIN] WiFi SSID: {}", config::WIFI_SSID);
}

#[cfg(target_arch = "riscv32")]
fn broker_endpoint(config: &IndicatorConfig) -> IpEndpoint {
    let address = config.broker().parse::<Ipv4Address>().unwrap_or_else(|_| {
        warn!(
            "[MQTT] Broker '{}' is not an IPv4 address, using {}",
            config.broker(),
            config::MQTT_BROKER_FALLBACK
        );
        config::MQTT_BROKER_FALLBACK
            .parse()
            .unwrap_or(Ipv4Address::new(192, 168, 1, 30))
    });
    IpEndpoint::new(IpAddress::Ipv4(address), config::MQTT_PORT)
}

#[cfg(target_arch = "riscv32")]
fn fatal(stage: &str, error: BoardError) -> ! {
    println!("[MAIN] ❌ {} failed: {:?}", stage, error);
    panic!("startup failed");
}

#[cfg(target_arch = "riscv32")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[MAIN] Panic: {}", info);
    loop {}
}

// Embassy task to run the network stack
#[cfg(target_arch = "riscv32")]
#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// Keeps the station associated; the broker link is supervised separately
#[cfg(target_arch = "riscv32")]
#[embassy_executor::task]
async fn wifi_task(mut wifi_manager: WiFiManager<'static>) -> ! {
    loop {
        if !wifi_manager.monitor_connection() {
            match wifi_manager
                .connect(config::WIFI_SSID, config::WIFI_PASSWORD)
                .await
            {
                Ok(()) => {
                    wifi_manager.wait_for_address().await;
                }
                Err(e) => warn!("[WIFI] Connection attempt failed: {:?}", e),
            }
        }

        Timer::after_millis(config::WIFI_RECONNECT_INTERVAL_MS).await;
    }
}

/// Cooperative indicator loop: drain, render and supervise
#[cfg(target_arch = "riscv32")]
#[embassy_executor::task]
async fn indicator_task(mut indicator: BoardIndicator) -> ! {
    info!("[CTRL] Indicator loop started");

    loop {
        let now_ms = Instant::now().as_millis();
        if let Err(e) = indicator.step(now_ms).await {
            warn!("[LED] Frame dropped: {:?}", e);
        }

        Timer::after_millis(1).await;
    }
}

#[cfg(target_arch = "riscv32")]
#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    // Heap for the WiFi driver
    esp_alloc::heap_allocator!(size: 72 * 1024);

    let config = IndicatorConfig::default();
    if let Err(e) = config.validate() {
        fatal("Configuration", e.into());
    }
    print_banner(&config);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let rng = Rng::new(peripherals.RNG);
    let Ok(wifi_init) = esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK) else {
        fatal("WiFi driver init", BoardError::WiFiError);
    };
    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let Ok((wifi_controller, wifi_interfaces)) = esp_wifi::wifi::new(wifi_init_ref, peripherals.WIFI)
    else {
        fatal("WiFi controller", BoardError::WiFiError);
    };
    println!("[WIFI] WiFi controller and device created successfully");

    // Create embassy-net stack with DHCP configuration
    let stack_resources = STACK_RESOURCES.init(StackResources::new());
    let (stack, runner): (Stack<'static>, _) = embassy_net::new(
        wifi_interfaces.sta,
        Config::dhcpv4(Default::default()),
        stack_resources,
        1234,
    );
    let wifi_manager = WiFiManager::new(wifi_controller, stack);

    // The smart LED adapter expects the RMT clocked at 80MHz
    println!("[LED] Setting up GPIO pin {} for LED data...", config::LED_DATA_PIN);
    let Ok(rmt) = Rmt::new(peripherals.RMT, Rate::from_mhz(80)) else {
        fatal("RMT init", BoardError::LedError);
    };
    let strip: LedStrip = SmartLedsAdapter::new(
        rmt.channel0,
        peripherals.GPIO18,
        smart_led_buffer!(config::MAX_PIXELS),
    );
    println!("[LED] ✅ {} pixel strip ready", config.pixel_count);

    let Ok(device_id) = make_device_id(config.device_type, config.client_id) else {
        fatal("Device id", config::ConfigError::Identity.into());
    };
    let device_id: &'static DeviceId = DEVICE_ID.init(device_id);

    let socket = SOCKET.init(RefCell::new(TcpSocket::new(
        stack,
        SOCKET_RX.init([0; 1024]),
        SOCKET_TX.init([0; 512]),
    )));
    let client = BrokerClient::new(
        socket,
        broker_endpoint(&config),
        device_id.as_str(),
        MQTT_TX.init([0; MQTT_PACKET_SIZE]),
        MQTT_RX.init([0; MQTT_PACKET_SIZE]),
    );

    let indicator = match Indicator::new(&config, client, strip) {
        Ok(indicator) => indicator,
        Err(e) => fatal("Indicator", e.into()),
    };

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning network task...");
        spawner.spawn(net_task(runner)).ok();

        println!("[MAIN] Spawning WiFi task...");
        spawner.spawn(wifi_task(wifi_manager)).ok();

        println!("[MAIN] Spawning indicator task...");
        match spawner.spawn(indicator_task(indicator)) {
            Ok(_) => println!("[MAIN] ✅ Indicator task spawned successfully"),
            Err(e) => println!("[MAIN] ❌ Failed to spawn indicator task: {:?}", e),
        }
    });
}
