//! Energy, packet loss and adaptation behaviour through the public API.

use motesim_common::{DevEui, GridPos, SimTime};
use motesim_network::{
    AdaptationConfig, AdaptationController, Energy, Environment, EnvironmentConfig, Gateway, Mote,
    NetworkEntity, PowerDecision, TerrainMap,
};
use motesim_radio::{LoraPhyConfig, Terrain};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

const TICK: SimTime = SimTime::from_micros(1_500_000);

fn environment(terrain: Terrain) -> Environment {
    let config = EnvironmentConfig {
        phy: LoraPhyConfig::default().without_shadowing(),
        seed: 11,
    };
    Environment::new(TerrainMap::uniform(5000, 5000, 10, terrain), config)
}

fn uplink(env: &mut Environment, mote: usize) {
    env.send_to_gateway(mote, &[], &BTreeMap::new()).unwrap();
    env.tick(TICK);
}

#[test]
fn test_energy_never_increases_or_goes_negative() {
    let mut env = environment(Terrain::Plain);
    let mote = env.add_mote(
        Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12).with_energy(Energy::Units(1)),
    );
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(100, 0), 14, 12));

    let mut last = env.motes()[mote].energy().units().unwrap();
    let mut sends = 0;
    while env.motes()[mote].has_energy() {
        uplink(&mut env, mote);
        sends += 1;
        let now = env.motes()[mote].energy().units().unwrap();
        assert!(now <= last);
        last = now;
        assert!(sends < 1_000, "mote never ran out of energy");
    }

    // An empty mote stays silent
    let before = env.transmissions().len();
    assert_eq!(env.send_to_gateway(mote, &[], &BTreeMap::new()).unwrap(), None);
    assert_eq!(env.transmissions().len(), before);
    assert_eq!(env.motes()[mote].energy(), Energy::Units(0));
}

#[test]
fn test_fractional_carry_is_split_independent() {
    let total = 3.75;
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    for _ in 0..20 {
        // Random split of `total` into a handful of positive parts
        let mut cuts: Vec<f64> = (0..4).map(|_| rng.gen_range(0.0..total)).collect();
        cuts.push(0.0);
        cuts.push(total);
        cuts.sort_by(f64::total_cmp);
        let parts: Vec<f64> = cuts.windows(2).map(|w| w[1] - w[0]).collect();

        let mut mote = Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12).with_energy(Energy::Units(10));
        for part in parts {
            mote.consume_energy(part);
        }
        assert_eq!(mote.energy(), Energy::Units(7));
        assert!((mote.energy_buffer() - 0.75).abs() < 1e-9);
    }
}

#[test]
fn test_unlimited_mote_records_energy_but_keeps_level() {
    let mut env = environment(Terrain::Plain);
    let mote = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12).with_energy(Energy::Unlimited));
    for _ in 0..3 {
        uplink(&mut env, mote);
    }
    assert_eq!(env.motes()[mote].energy(), Energy::Unlimited);
    assert_eq!(env.motes()[mote].used_energy(0).unwrap().len(), 3);
}

#[test]
fn test_packet_loss_counts_any_clean_receiver() {
    let mut env = environment(Terrain::City);
    let sender = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12));
    // No gateway in range, but another mote is close by
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(1_000_000, 0), 14, 12));
    let relay = env.add_mote(Mote::new(DevEui(2), GridPos::new(50, 0), 14, 12));

    for _ in 0..4 {
        uplink(&mut env, sender);
    }
    assert_eq!(env.calculate_packet_loss(sender, 0).unwrap(), 0.0);
    assert_eq!(env.calculate_packet_loss(relay, 0).unwrap(), 0.0);
    assert_eq!(env.motes()[sender].sent_packets(), 4);
    assert_eq!(env.motes()[sender].lost_packets(), 0);
}

#[test]
fn test_packet_loss_ratio() {
    let mut env = environment(Terrain::City);
    let near = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12));
    let far = env.add_mote(Mote::new(DevEui(2), GridPos::new(3_000_000, 0), 14, 12));
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(100, 0), 14, 12));

    for _ in 0..3 {
        uplink(&mut env, near);
        uplink(&mut env, far);
    }

    assert_eq!(env.calculate_packet_loss(near, 0).unwrap(), 0.0);
    assert_eq!(env.calculate_packet_loss(far, 0).unwrap(), 1.0);
    assert_eq!(env.packet_stats(far, 0).unwrap().sent, 3);
    assert_eq!(env.motes()[far].lost_packets(), 3);
}

#[test]
fn test_packet_loss_per_run() {
    let mut env = environment(Terrain::Plain);
    let mote = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12));
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(100, 0), 14, 12));
    uplink(&mut env, mote);

    env.begin_new_run();
    assert_eq!(env.calculate_packet_loss(mote, 1).unwrap(), 0.0);
    assert_eq!(env.packet_stats(mote, 1).unwrap().sent, 0);
    assert_eq!(env.packet_stats(mote, 0).unwrap().sent, 1);
    assert_eq!(env.motes()[mote].core().number_of_runs(), 2);
}

#[test]
fn test_adaptation_lowers_power_of_close_mote() {
    let mut env = environment(Terrain::Plain);
    let mote = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12));
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(10, 0), 14, 12));
    let mut controller = AdaptationController::new(AdaptationConfig::default());

    for expected in 1..5 {
        uplink(&mut env, mote);
        assert_eq!(
            controller.observe(&mut env, mote).unwrap(),
            PowerDecision::Collecting { samples: expected }
        );
    }
    uplink(&mut env, mote);
    assert_eq!(
        controller.observe(&mut env, mote).unwrap(),
        PowerDecision::Decrease { from_dbm: 14, to_dbm: 13 }
    );
    assert_eq!(env.motes()[mote].tx_power_dbm(), 13);
    assert!(controller.buffered(DevEui(1)).is_empty());

    // The power in effect at each send is recorded
    uplink(&mut env, mote);
    let powers: Vec<i32> = env.motes()[mote]
        .core()
        .power_setting_history(0)
        .iter()
        .map(|&(_, p)| p)
        .collect();
    assert_eq!(powers, vec![14, 14, 14, 14, 14, 13]);
}

#[test]
fn test_adaptation_raises_power_of_distant_mote() {
    let mut env = environment(Terrain::Plain);
    let mote = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 10, 12));
    // 10 dBm - 66 dB
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(2000, 0), 14, 12));
    let mut controller = AdaptationController::new(AdaptationConfig::default());

    let mut last = PowerDecision::NoObservation;
    for _ in 0..5 {
        uplink(&mut env, mote);
        last = controller.observe(&mut env, mote).unwrap();
    }
    assert_eq!(last, PowerDecision::Increase { from_dbm: 10, to_dbm: 11 });
}

#[test]
fn test_adaptation_ignores_unheard_uplinks() {
    let mut env = environment(Terrain::City);
    let mote = env.add_mote(Mote::new(DevEui(1), GridPos::new(0, 0), 14, 12));
    env.add_gateway(Gateway::new(DevEui(100), GridPos::new(1_000_000, 0), 14, 12));
    let mut controller = AdaptationController::new(AdaptationConfig::default());

    uplink(&mut env, mote);
    assert_eq!(controller.observe(&mut env, mote).unwrap(), PowerDecision::NoObservation);
    assert!(controller.buffered(DevEui(1)).is_empty());
    assert!(controller.observe(&mut env, 9).is_err());
}
