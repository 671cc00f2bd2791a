use linfa::prelude::*;
use ndarray::{array, Array2};
use seqgp_gp::{mean_models::ZeroMean, GpClassifier, GpRegressor, Objective};
use seqgp_kernels::{ContactKernel, IdentityKernel};

fn encode(seqs: &[&str]) -> Array2<char> {
    let flat: Vec<char> = seqs.iter().flat_map(|s| s.chars()).collect();
    Array2::from_shape_vec((seqs.len(), seqs[0].len()), flat).expect("sequences of equal length")
}

fn main() {
    env_logger::init();

    let xt = encode(&["MKVL", "MRVL", "MKIL", "MRIL", "AKVL", "ARIL", "MKVA"]);
    let yt = array![1.2, 0.9, 0.4, 0.1, 0.8, -0.5, 0.6];

    println!("Train sequence GP on {} variants", xt.nrows());
    let gp = GpRegressor::params(ZeroMean(), IdentityKernel::new())
        .objective(Objective::LeaveOneOut)
        .n_start(4)
        .fit(&Dataset::new(xt.clone(), yt.clone()))
        .expect("GP fitting");
    println!("{gp}");

    let xtest = encode(&["AKIL", "MRVA"]);
    let (mean, cov) = gp.predict(&xtest).expect("GP prediction");
    println!("Predicted means {mean} and variances {}", cov.diag());
    println!("LOO predictions (mu, v):\n{}", gp.loo_residuals(false, true).expect("LOO"));
    println!(
        "Training scores {:?}",
        gp.score(&xt, &yt, &["kendalltau", "R2", "R"]).expect("scores")
    );

    let alphabets = vec![vec!['M', 'A'], vec!['K', 'R'], vec!['V', 'I'], vec!['L', 'A']];
    let contacts = ContactKernel::new(&[(0, 1), (1, 2), (2, 3)], &alphabets).expect("contacts");
    let labels = yt.mapv(|v| if v > 0.5 { 1. } else { -1. });
    let gpc = GpClassifier::params(contacts)
        .fit(&Dataset::new(xt.clone(), labels.clone()))
        .expect("GP classifier fitting");
    println!("{gpc}");
    let (pi_star, _, _) = gpc.predict(&xtest).expect("GP classifier prediction");
    println!("Predicted probabilities {pi_star}");
    println!("Training AUC {}", gpc.score(&xt, &labels).expect("AUC"));
}
