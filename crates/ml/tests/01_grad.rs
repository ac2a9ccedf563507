use ml::distributions::squashed_sample;
use ml::{Activation, Mlp, Tape, Tensor, Var};

const EPS: f32 = 1e-3;

/// Compares tape gradients of `f` against central differences for every
/// element of every input.
fn finite_diff_check<F>(inputs: &[Tensor], f: F)
where
    F: Fn(&mut Tape, &[Var]) -> Var,
{
    let eval = |values: &[Tensor]| -> f32 {
        let mut tape = Tape::new();
        let vars: Vec<Var> = values.iter().map(|t| tape.constant(t.clone())).collect();
        let out = f(&mut tape, &vars);
        tape.value(out).data[0]
    };

    let mut tape = Tape::new();
    let vars: Vec<Var> = inputs.iter().map(|t| tape.param(t)).collect();
    let loss = f(&mut tape, &vars);
    tape.backward(loss).unwrap();

    for (i, input) in inputs.iter().enumerate() {
        let analytical =
            tape.grad(vars[i]).map(<[f32]>::to_vec).unwrap_or_else(|| vec![0.0; input.len()]);
        for j in 0..input.len() {
            let mut plus = inputs.to_vec();
            let mut minus = inputs.to_vec();
            plus[i].data[j] += EPS;
            minus[i].data[j] -= EPS;
            let numerical = (eval(&plus) - eval(&minus)) / (2.0 * EPS);
            let tol = 2e-2 * analytical[j].abs().max(1.0);
            assert!(
                (numerical - analytical[j]).abs() < tol,
                "input {i} element {j}: numerical {numerical}, analytical {}",
                analytical[j]
            );
        }
    }
}

#[test]
fn elementwise_ops_fd() {
    let a = Tensor::from_vec(vec![2, 2], vec![0.3, 1.2, 0.7, 2.0]);
    let b = Tensor::from_vec(vec![2, 2], vec![-0.5, 0.4, 1.1, 0.9]);
    finite_diff_check(&[a, b], |tape, v| {
        let e = tape.exp(v[1]);
        let l = tape.log(v[0]);
        let prod = tape.mul(e, l);
        let t = tape.tanh(prod);
        let m = tape.min(t, v[1]);
        let s = tape.sub(m, v[0]);
        let sq = tape.square(s);
        tape.reduce_mean(sq)
    });
}

#[test]
fn matmul_and_bias_fd() {
    let x = Tensor::from_vec(vec![2, 3], vec![0.9, -0.1, 0.3, 0.2, 0.5, -0.7]);
    let w = Tensor::from_vec(vec![2, 3], vec![0.1, -0.4, 0.25, 0.6, 0.05, -0.3]);
    let b = Tensor::from_vec(vec![2], vec![0.2, -0.1]);
    finite_diff_check(&[x, w, b], |tape, v| {
        let y = tape.matmul(v[0], v[1]);
        let y = tape.add_broadcast(y, v[2]);
        let y = tape.tanh(y);
        let y = tape.row_sum(y);
        tape.reduce_sum(y)
    });
}

#[test]
fn column_ops_fd() {
    let a = Tensor::from_vec(vec![2, 2], vec![0.5, -1.0, 2.0, 0.25]);
    let b = Tensor::from_vec(vec![2, 1], vec![1.5, -0.5]);
    finite_diff_check(&[a, b], |tape, v| {
        let joined = tape.concat(v[0], v[1]);
        let picked = tape.gather(joined, &[2, 0]);
        let tail = tape.slice(joined, 1, 2);
        let tail = tape.square(tail);
        let tail = tape.row_sum(tail);
        let both = tape.mul(picked, tail);
        tape.reduce_mean(both)
    });
}

#[test]
fn prelu_slope_fd() {
    let x = Tensor::from_vec(vec![1, 4], vec![-1.5, -0.4, 0.8, 2.0]);
    let alpha = Tensor::from_vec(vec![1], vec![0.25]);
    finite_diff_check(&[x, alpha], |tape, v| {
        let y = tape.prelu(v[0], v[1]);
        let y = tape.square(y);
        tape.reduce_sum(y)
    });
}

#[test]
fn scale_by_variable_fd() {
    let x = Tensor::from_vec(vec![1, 3], vec![0.2, -0.6, 1.4]);
    let k = Tensor::scalar(-0.8);
    finite_diff_check(&[x, k], |tape, v| {
        let e = tape.exp(v[1]);
        let y = tape.scale(v[0], e);
        let y = tape.pow(y, 3.0);
        tape.reduce_sum(y)
    });
}

#[test]
fn squashed_sample_fd() {
    let mean = Tensor::from_vec(vec![2, 1], vec![0.3, -0.2]);
    let log_std = Tensor::from_vec(vec![2, 1], vec![-0.5, 0.1]);
    let noise = Tensor::from_vec(vec![2, 1], vec![0.7, -1.1]);
    finite_diff_check(&[mean, log_std], move |tape, v| {
        let n = tape.constant(noise.clone());
        let s = squashed_sample(tape, v[0], v[1], n, 2.0);
        let a = tape.square(s.action);
        let total = tape.add(a, s.log_prob);
        tape.reduce_mean(total)
    });
}

#[test]
fn mlp_parameters_fd() {
    let mut rng = fastrand::Rng::with_seed(5);
    let net = Mlp::new(&[3, 5, 2], Activation::Tanh, &mut rng);
    let x = Tensor::from_vec(vec![2, 3], vec![0.9, -0.1, 0.3, -0.4, 0.6, 0.2]);

    let mut tape = Tape::new();
    let bound = net.bind(&mut tape, true);
    let input = tape.constant(x.clone());
    let out = net.forward(&mut tape, &bound, input);
    let sq = tape.square(out);
    let loss = tape.reduce_mean(sq);
    tape.backward(loss).unwrap();
    let grads = net.gradients(&tape, &bound);

    let loss_of = |candidate: &Mlp| -> f32 {
        let y = candidate.predict(&x);
        y.data.iter().map(|v| v * v).sum::<f32>() / y.len() as f32
    };

    for (i, grad) in grads.iter().enumerate() {
        for j in 0..grad.len() {
            let mut plus = net.clone();
            let mut minus = net.clone();
            plus.params_mut()[i].data[j] += EPS;
            minus.params_mut()[i].data[j] -= EPS;
            let numerical = (loss_of(&plus) - loss_of(&minus)) / (2.0 * EPS);
            assert!(
                (numerical - grad[j]).abs() < 2e-2 * grad[j].abs().max(1.0),
                "param {i}[{j}]: numerical {numerical}, analytical {}",
                grad[j]
            );
        }
    }
}

#[test]
fn frozen_network_gets_no_gradient() {
    let mut rng = fastrand::Rng::with_seed(9);
    let actor = Mlp::new(&[2, 4, 1], Activation::Relu, &mut rng);
    let critic = Mlp::new(&[3, 4, 1], Activation::Relu, &mut rng);

    let mut tape = Tape::new();
    let actor_vars = actor.bind(&mut tape, true);
    let critic_vars = critic.bind(&mut tape, false);
    let obs = tape.constant(Tensor::row(&[0.4, -0.3]));
    let action = actor.forward(&mut tape, &actor_vars, obs);
    let joined = tape.concat(obs, action);
    let q = critic.forward(&mut tape, &critic_vars, joined);
    let loss = tape.reduce_mean(q);
    tape.backward(loss).unwrap();

    assert!(critic_vars.vars().iter().all(|&v| tape.grad(v).is_none()));
    assert!(actor_vars.vars().iter().any(|&v| tape.grad(v).is_some()));
}
