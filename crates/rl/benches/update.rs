use criterion::{black_box, criterion_group, criterion_main, Criterion};
use physics::{Action, CartPoleEnv, EnvConfig};
use rl::{Agent, DdpgAgent, DdpgConfig, Transition};

fn bench_env_step(c: &mut Criterion) {
    let mut env = CartPoleEnv::new(EnvConfig { horizon: None, ..EnvConfig::continuous() });
    env.reset(Some(0.0));
    c.bench_function("cartpole_step", |b| {
        b.iter(|| {
            let step =
                env.step(black_box(Action::Continuous(0.0))).unwrap_or_else(|e| panic!("{e}"));
            if step.done {
                env.reset(Some(0.0));
            }
        });
    });
}

fn bench_ddpg_update(c: &mut Criterion) {
    let config = DdpgConfig::default();
    let mut agent = DdpgAgent::new(&config, 4, 10.0, 0);
    let mut env = CartPoleEnv::new(EnvConfig::continuous());
    let mut obs = env.reset(None);
    let mut rng = fastrand::Rng::with_seed(1);
    for _ in 0..config.batch_size * 4 {
        let action = Action::Continuous(rng.f32() * 20.0 - 10.0);
        let step = env.step(action).unwrap_or_else(|e| panic!("{e}"));
        let transition = Transition {
            state: obs,
            action,
            reward: step.reward,
            next_state: step.obs.clone(),
            done: step.info.termination.is_some_and(|t| t.is_terminal()),
        };
        obs = if step.done { env.reset(None) } else { step.obs };
        agent.observe(transition).unwrap_or_else(|e| panic!("{e}"));
    }
    let batch = rl::Batch::from_transitions(agent.buffer().iter().take(config.batch_size));
    c.bench_function("ddpg_update", |b| {
        b.iter(|| agent.update(black_box(&batch)).unwrap_or_else(|e| panic!("{e}")));
    });
}

criterion_group!(benches, bench_env_step, bench_ddpg_update);
criterion_main!(benches);
