use std::sync::{Arc, Mutex};

use daikin_lan::{
    Dialect, EnergyMode, EnergyPeriod, Error, FieldChange, MessageLogMode, Reading, Resolver,
    Settings, Temperature,
};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASIC_INFO: &str = "ret=OK,type=aircon,reg=eu,dst=1,ver=1_2_54,rev=203DE8C,pow=1,err=0,location=0,name=%4e%6f%74%74%65,icon=3,method=home only,port=30050,id=,pw=,lpw_flag=0,adp_kind=3,pv=3.20,cpv=3,cpv_minor=20,led=1,en_setzone=1,mac=409F38D107AC,adp_mode=run,en_hol=0,ssid1=Pinguino Curioso,radio1=-35,grp_name=,en_grp=0";
const SENSOR_INFO: &str = "ret=OK,htemp=25.0,hhum=-,otemp=21.0,err=0,cmpfreq=40";
const CONTROL_INFO: &str = "ret=OK,pow=1,mode=3,adv=,stemp=24.0,shum=0,dt1=25.0,dt2=M,dt3=24.0,dt4=22.0,dt5=25.0,dt7=25.0,dh1=AUTO,dh2=50,dh3=0,dh4=0,dh5=0,dh7=AUTO,dhh=50,b_mode=3,b_stemp=24.0,b_shum=0,alert=255,f_rate=A,f_dir=0,b_f_rate=5,b_f_dir=0,dfr1=5,dfr2=5,dfr3=A,dfr4=5,dfr5=5,dfr6=3,dfr7=5,dfrh=5,dfd1=0,dfd2=0,dfd3=2,dfd4=0,dfd5=0,dfd6=2,dfd7=0,dfdh=0";
const WEEK_POWER: &str = "ret=OK,today_runtime=38,datas=5700/4000/6100/3900/2200/3400/400";
const YEAR_POWER: &str = "ret=OK,previous_year=7/0/1/0/1/21/57/24/2/0/0/2,this_year=4/0/0/0/1/18/40/53";
const DAY_POWER: &str = "ret=OK,curr_day_heat=0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0,prev_1day_heat=0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0/0,curr_day_cool=0/0/0/0/0/0/0/0/0/0/1/0/0/0/0/0/0/0/0/0/0/0/0/0,prev_1day_cool=0/1/0/1/0/1/0/1/0/2/3/2/3/1/0/0/0/0/5/1/0/1/1/0";

const FW_STATUS: &str = r#"{"responses": [
    {"fr": "/dsiot/edge/adr_0100.dgc_status", "pc": {"pn": "dgc_status", "pch": [
        {"pn": "e_1002", "pch": [
            {"pn": "e_A002", "pch": [{"pn": "p_01", "pv": "01"}]},
            {"pn": "e_3001", "pch": [
                {"pn": "p_01", "pv": "0200"},
                {"pn": "p_02", "pv": "30"},
                {"pn": "p_09", "pv": "0A00"},
                {"pn": "p_05", "pv": "0F0000"},
                {"pn": "p_06", "pv": "000000"}
            ]},
            {"pn": "e_A00B", "pch": [{"pn": "p_01", "pv": "18"}, {"pn": "p_02", "pv": "3c"}]}
        ]}
    ]}},
    {"fr": "/dsiot/edge/adr_0200.dgc_status", "pc": {"pn": "dgc_status", "pch": [
        {"pn": "e_1003", "pch": [{"pn": "e_A00D", "pch": [{"pn": "p_01", "pv": "22"}]}]}
    ]}},
    {"fr": "/dsiot/edge/adr_0100.i_power.week_power", "pc": {"pn": "week_power", "pch": [
        {"pn": "today_runtime", "pv": "120"},
        {"pn": "datas", "pv": [100, 200, 300, 400, 500, 600, 700]}
    ]}},
    {"fr": "/dsiot/edge.adp_i", "pc": {"pn": "adp_i", "pch": [{"pn": "mac", "pv": "112233445566"}]}}
]}"#;

fn target(server: &MockServer) -> String {
    server.address().to_string()
}

async fn mount_get(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_basic(server: &MockServer) {
    mount_get(server, "/common/basic_info", BASIC_INFO).await;
    mount_get(server, "/aircon/get_sensor_info", SENSOR_INFO).await;
    mount_get(server, "/aircon/get_control_info", CONTROL_INFO).await;
    mount_get(server, "/aircon/get_week_power", WEEK_POWER).await;
    mount_get(server, "/aircon/get_year_power", YEAR_POWER).await;
    mount_get(server, "/aircon/get_day_power_ex", DAY_POWER).await;
    mount_get(server, "/common/get_holiday", "ret=OK,en_hol=0").await;
}

async fn mount_airbase(server: &MockServer) {
    mount_get(server, "/skyfi/common/basic_info", "ret=OK,type=aircon,reg=au,ver=1_1_8,pow=1,err=0,name=%54%65%73%74,mac=0123456789AB").await;
    mount_get(
        server,
        "/skyfi/aircon/get_control_info",
        "ret=OK,pow=1,mode=2,operate=2,bk_auto=2,stemp=23,dt1=20,dt2=23,f_rate=1,dfr1=1,dfr2=1,f_airside=0,airside1=0,airside2=0,f_auto=1,auto1=1,auto2=1,f_dir=0,dfd1=0,dfd2=0,filter_sign_info=0,cent=0,en_cent=0,remo=2",
    )
    .await;
    mount_get(server, "/skyfi/aircon/get_model_info", "ret=OK,model=NOTSUPPORT,type=N,humd=0,s_humd=0,en_zone=3,en_filter_sign=1,acled=1,land=0,elec=0,temp=1,m_dtct=0,ac_dst=au,dmnd=0,en_temp_setting=1,en_frate=1,en_fdir=0,en_rtemp_a=0,en_spmode=0,en_ipw_sep=0,en_scdltmr=0,en_mompow=0,en_patrol=0,en_airside=0,en_quick_timer=1,en_auto=1,en_dry=1,en_common_zone=0,cool_l=16,cool_h=32,heat_l=16,heat_h=32,frate_steps=3,en_frate_auto=1").await;
    mount_get(server, "/skyfi/aircon/get_sensor_info", "ret=OK,err=0,htemp=22,otemp=-").await;
    mount_get(
        server,
        "/skyfi/aircon/get_zone_setting",
        "ret=OK,zone_name=%20%20%20%20Zone%201%3b%20%20%20%20Zone%202%3b%20%20%20%20Zone%203%3b%20%20%20%20Zone%204,zone_onoff=1%3b0%3b1%3b0",
    )
    .await;
}

#[tokio::test]
async fn basic_info_alone_resolves_basic_not_airbase() {
    let server = MockServer::start().await;
    mount_get(&server, "/common/basic_info", BASIC_INFO).await;

    let mut session = Resolver::builder()
        .build()
        .resolve(&target(&server))
        .await
        .expect("resolve should succeed");

    assert_eq!(session.dialect(), Dialect::Basic);
    assert_eq!(session.name(), Reading::Value("Notte".to_string()));
    assert_eq!(session.mac(), Reading::Value("40:9F:38:D1:07:AC".to_string()));
    // Declared by the control resource, which answered 404.
    assert_eq!(session.target_temperature(), Reading::Absent);
}

#[tokio::test]
async fn failing_secondary_resource_does_not_block_resolution() {
    let server = MockServer::start().await;
    mount_get(&server, "/common/basic_info", BASIC_INFO).await;
    mount_get(&server, "/aircon/get_sensor_info", SENSOR_INFO).await;
    mount_get(&server, "/aircon/get_control_info", CONTROL_INFO).await;
    Mock::given(method("GET"))
        .and(path("/aircon/get_price"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .max_attempts(1)
        .build()
        .resolve(&target(&server))
        .await
        .expect("resolve should succeed");

    assert_eq!(session.dialect(), Dialect::Basic);
    assert_eq!(session.mode(), Reading::Value("cool".to_string()));
    assert!(session.store().last_fetched("aircon/get_price").is_none());
    assert!(session.store().last_fetched("aircon/get_control_info").is_some());
}

#[tokio::test]
async fn init_requests_every_basic_resource_and_sets_clock() {
    let server = MockServer::start().await;
    mount_basic(&server).await;
    Mock::given(method("GET"))
        .and(path("/common/get_datetime"))
        .and(query_param("cur", ""))
        .respond_with(ResponseTemplate::new(200).set_body_string("ret=OK"))
        .expect(1)
        .mount(&server)
        .await;

    let session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .expect("connect should succeed");

    let requests = server.received_requests().await.unwrap();
    for resource in session.descriptor().resources {
        let wanted = format!("/{}", resource.path);
        assert!(
            requests.iter().any(|r| r.url.path() == wanted),
            "missing request for {wanted}"
        );
    }
}

#[tokio::test]
async fn unresolved_collects_every_cause() {
    let server = MockServer::start().await;

    let err = Resolver::builder()
        .build()
        .resolve(&target(&server))
        .await
        .err()
        .expect("nothing answers");

    match err {
        Error::Unresolved(causes) => {
            assert_eq!(causes.len(), 3);
            assert!(causes[0].starts_with("firmware-2.8"));
            assert!(causes[1].starts_with("basic"));
            assert!(causes[2].starts_with("airbase"));
        }
        other => panic!("expected Unresolved, got {other:?}"),
    }
}

#[tokio::test]
async fn power_off_sends_previous_mode_with_pow_zero() {
    let server = MockServer::start().await;
    mount_basic(&server).await;
    Mock::given(method("GET"))
        .and(path("/aircon/set_control_info"))
        .and(query_param("mode", "3"))
        .and(query_param("pow", "0"))
        .and(query_param("stemp", "24.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ret=OK,adv="))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();
    assert_eq!(session.mode(), Reading::Value("cool".to_string()));

    session.apply(&Settings::new().mode("off")).await.expect("apply should succeed");
    assert_eq!(session.mode(), Reading::Value("off".to_string()));
}

#[tokio::test]
async fn mode_change_uses_remembered_target() {
    let server = MockServer::start().await;
    mount_basic(&server).await;
    Mock::given(method("GET"))
        .and(path("/aircon/set_control_info"))
        .and(query_param("mode", "4"))
        .and(query_param("pow", "1"))
        .and(query_param("stemp", "22.0"))
        .and(query_param("f_rate", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ret=OK"))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();
    session.apply(&Settings::new().mode("hot")).await.unwrap();

    assert_eq!(session.mode(), Reading::Value("hot".to_string()));
    assert_eq!(session.fan_rate(), Reading::Value("3".to_string()));
}

#[tokio::test]
async fn invalid_setting_sends_nothing() {
    let server = MockServer::start().await;
    mount_basic(&server).await;
    Mock::given(method("GET"))
        .and(path("/aircon/set_control_info"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ret=OK"))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();
    let err = session.apply(&Settings::new().fan_rate("turbo")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidSetting { .. }));
}

#[tokio::test]
async fn basic_readings() {
    let server = MockServer::start().await;
    mount_basic(&server).await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();

    assert_eq!(session.inside_temperature(), Reading::Value(Temperature::from_celsius(25.0)));
    assert_eq!(session.outside_temperature(), Reading::Value(Temperature::from_celsius(21.0)));
    assert_eq!(session.humidity(), Reading::Absent);
    assert_eq!(session.compressor_frequency(), Reading::Value(40.0));
    assert_eq!(session.fan_rate(), Reading::Value("auto".to_string()));
    assert_eq!(session.swing(), Reading::Value("off".to_string()));
    assert_eq!(session.away_mode(), Reading::Value(false));
    assert_eq!(session.zones(), Reading::Unsupported);
    assert_eq!(session.get("ssid1"), Some("Pinguino Curioso"));

    assert_eq!(session.energy(EnergyMode::Total, EnergyPeriod::Today), Reading::Value(0.4));
    assert_eq!(session.energy(EnergyMode::Total, EnergyPeriod::Yesterday), Reading::Value(3.4));
    assert_eq!(session.energy(EnergyMode::Cool, EnergyPeriod::Today), Reading::Value(0.1));
    assert_eq!(session.energy(EnergyMode::Total, EnergyPeriod::ThisYear), Reading::Value(116.0));
    assert_eq!(session.energy(EnergyMode::Heat, EnergyPeriod::Last7Days), Reading::Unsupported);
    assert!(session.current_total_power().is_supported());
}

#[tokio::test]
async fn refresh_only_fetches_stale_resources() {
    let server = MockServer::start().await;
    mount_basic(&server).await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();
    let before = server.received_requests().await.unwrap().len();

    session.refresh().await.unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), before);

    // Reading a sensor field schedules only its resource.
    session.inside_temperature();
    session.refresh().await.unwrap();
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), before + 1);
    assert_eq!(requests.last().unwrap().url.path(), "/aircon/get_sensor_info");
}

#[tokio::test]
async fn zero_ttl_refetches_every_cycle() {
    let server = MockServer::start().await;
    mount_basic(&server).await;

    let mut session = Resolver::builder()
        .cache_ttl(chrono::TimeDelta::zero())
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();
    let first = session.store().last_fetched("aircon/get_sensor_info").unwrap();

    session.refresh().await.unwrap();
    let sensor = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/aircon/get_sensor_info")
        .count();
    assert_eq!(sensor, 2);
    assert!(session.store().last_fetched("aircon/get_sensor_info").unwrap() >= first);
}

#[tokio::test]
async fn energy_resources_join_refresh_once_supported() {
    let server = MockServer::start().await;
    mount_basic(&server).await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();

    session.energy(EnergyMode::Total, EnergyPeriod::Today);
    session.refresh().await.unwrap();

    let week_power = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/aircon/get_week_power")
        .count();
    assert_eq!(week_power, 2);
}

#[tokio::test]
async fn failed_resource_keeps_cached_fields() {
    let server = MockServer::start().await;
    mount_get(&server, "/common/basic_info", BASIC_INFO).await;
    Mock::given(method("GET"))
        .and(path("/aircon/get_sensor_info"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SENSOR_INFO))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/aircon/get_sensor_info"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/aircon/get_control_info"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CONTROL_INFO))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_get(&server, "/aircon/get_control_info", "ret=OK,pow=1,mode=4,stemp=21.0,shum=0,f_rate=A,f_dir=0").await;

    let mut session = Resolver::builder()
        .max_attempts(1)
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();

    session.inside_temperature();
    session.mode();
    let err = session.refresh().await.unwrap_err();
    assert!(matches!(err, Error::Status(500)));

    assert_eq!(session.mode(), Reading::Value("hot".to_string()));
    assert_eq!(session.inside_temperature(), Reading::Value(Temperature::from_celsius(25.0)));
}

#[tokio::test]
async fn change_callbacks_see_every_new_field() {
    let server = MockServer::start().await;
    mount_basic(&server).await;

    let changes: Arc<Mutex<Vec<FieldChange>>> = Arc::new(Mutex::new(vec![]));
    let changes_clone = changes.clone();
    let mut session = Resolver::builder()
        .on_change(move |change| changes_clone.lock().unwrap().push(change.clone()))
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();

    {
        let captured = changes.lock().unwrap();
        let htemp = captured.iter().find(|c| c.field == "htemp").expect("htemp change");
        assert_eq!(htemp.resource, "aircon/get_sensor_info");
        assert_eq!(htemp.old, None);
        assert_eq!(htemp.new, "25.0");
    }

    changes.lock().unwrap().clear();
    session.inside_temperature();
    session.refresh().await.unwrap();
    assert!(changes.lock().unwrap().is_empty(), "unchanged values are not reported");
}

#[tokio::test]
async fn message_log_records_traffic() {
    let server = MockServer::start().await;
    mount_basic(&server).await;
    let log = tempfile::NamedTempFile::new().unwrap();
    let log_path = log.path().to_str().unwrap().to_string();

    Resolver::builder()
        .message_log(MessageLogMode::Diffed, &log_path)
        .build()
        .connect(&target(&server), Dialect::Basic)
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(lines.iter().any(|l| l["dir"] == "req" && l["path"] == "common/basic_info"));
    assert!(lines
        .iter()
        .any(|l| l["dir"] == "resp" && l["resource"] == "aircon/get_sensor_info" && l["fields"]["htemp"] == "25.0"));
}

#[tokio::test]
async fn airbase_is_the_fallback_dialect() {
    let server = MockServer::start().await;
    mount_airbase(&server).await;

    let mut session = Resolver::builder()
        .build()
        .resolve(&target(&server))
        .await
        .expect("resolve should fall back to AirBase");

    assert_eq!(session.dialect(), Dialect::AirBase);
    assert_eq!(session.fan_rate(), Reading::Value("low/auto".to_string()));
    assert_eq!(session.get("model"), Some("Airbase BRP15B61"));
    assert_eq!(session.outside_temperature(), Reading::Absent);
    assert_eq!(session.inside_temperature(), Reading::Value(Temperature::from_celsius(22.0)));
    assert_eq!(session.target_humidity(), Reading::Absent);
    assert_eq!(session.swing(), Reading::Unsupported);
    assert_eq!(session.away_mode(), Reading::Unsupported);
    assert_eq!(session.fan_rates().len(), 7);

    let Reading::Value(zones) = session.zones() else {
        panic!("zones expected");
    };
    assert_eq!(zones.len(), 3);
    assert_eq!(zones[0].name, "Zone 1");
    assert!(zones[0].on);
    assert!(!zones[1].on);
}

#[tokio::test]
async fn airbase_fan_rate_is_split_on_set() {
    let server = MockServer::start().await;
    mount_airbase(&server).await;
    Mock::given(method("GET"))
        .and(path("/skyfi/aircon/set_control_info"))
        .and(query_param("f_rate", "3"))
        .and(query_param("f_auto", "1"))
        .and(query_param("mode", "2"))
        .and(query_param("pow", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ret=OK"))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::AirBase)
        .await
        .unwrap();
    session.apply(&Settings::new().fan_rate("mid/auto")).await.unwrap();

    assert_eq!(session.fan_rate(), Reading::Value("mid/auto".to_string()));
}

#[tokio::test]
async fn airbase_zone_power_echoes_names() {
    let server = MockServer::start().await;
    mount_airbase(&server).await;
    Mock::given(method("GET"))
        .and(path("/skyfi/aircon/set_zone_setting"))
        .and(query_param("zone_onoff", "1;1;1;0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ret=OK"))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .build()
        .connect(&target(&server), Dialect::AirBase)
        .await
        .unwrap();

    let applied = session.set_zone_power(1, true).await.unwrap();
    assert_eq!(applied, daikin_lan::Applied::Sent);
    assert_eq!(
        session.set_holiday("on").await.unwrap(),
        daikin_lan::Applied::Unsupported
    );
}

#[tokio::test]
async fn skyfi_password_leads_every_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ac.cgi"))
        .and(query_param("pass", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "opmode=1&units=.&settemp=24.0&fanspeed=2&fanflags=1&acmode=8&tonact=0&roomtemp=23.0&outsidetemp=17.0&louvre=1&flags=0",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nz=2&zone=128&zone1=Lounge&zone2=Zone%202"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/set.cgi"))
        .and(query_param("p", "1"))
        .and(query_param("m", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "opmode=1&settemp=24.0&fanspeed=2&fanflags=1&acmode=2&roomtemp=23.0&outsidetemp=17.0",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .password("s3cret")
        .build()
        .resolve(&target(&server))
        .await
        .expect("resolve should succeed");

    assert_eq!(session.dialect(), Dialect::SkyFi);
    assert_eq!(session.mode(), Reading::Value("cool".to_string()));
    assert_eq!(session.fan_rate(), Reading::Value("medium".to_string()));
    assert_eq!(session.target_temperature(), Reading::Value(Temperature::from_celsius(24.0)));

    let Reading::Value(zones) = session.zones() else {
        panic!("zones expected");
    };
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].name, "Lounge");
    assert!(zones[0].on);

    session.apply(&Settings::new().mode("hot")).await.unwrap();
    assert_eq!(session.mode(), Reading::Value("hot".to_string()));

    for request in server.received_requests().await.unwrap() {
        let query = request.url.query().unwrap_or_default();
        assert!(query.starts_with("pass=s3cret"), "{query}");
    }
}

#[tokio::test]
async fn firmware_resolves_and_writes_hex_target() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dsiot/multireq"))
        .and(body_string_contains(r#""op":2"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(FW_STATUS))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dsiot/multireq"))
        .and(body_string_contains(r#""op":3"#))
        .and(body_string_contains(r#"{"pn":"p_02","pv":"32"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"responses": [{"fr": "/dsiot/edge/adr_0100.dgc_status", "rsc": 2004}]}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = Resolver::builder()
        .build()
        .resolve(&target(&server))
        .await
        .expect("resolve should succeed");

    assert_eq!(session.dialect(), Dialect::Firmware28);
    assert_eq!(session.mode(), Reading::Value("cool".to_string()));
    assert_eq!(session.target_temperature(), Reading::Value(Temperature::from_celsius(24.0)));
    assert_eq!(session.humidity(), Reading::Value(60.0));
    assert_eq!(session.swing(), Reading::Value("vertical".to_string()));
    assert_eq!(session.mac(), Reading::Value("11:22:33:44:55:66".to_string()));
    assert_eq!(session.energy(EnergyMode::Total, EnergyPeriod::Today), Reading::Value(0.7));
    assert_eq!(session.energy(EnergyMode::Cool, EnergyPeriod::Today), Reading::Unsupported);

    session
        .apply(&Settings::new().target_temperature(Temperature::from_celsius(25.0)))
        .await
        .expect("apply should succeed");

    let writes = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains(r#""op":3"#))
        .count();
    assert_eq!(writes, 1);
}
