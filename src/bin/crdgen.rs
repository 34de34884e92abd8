//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition YAML for
//! `ParameterMapping` from its Rust type definition.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/parametermapping.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use parameter_sync_controller::crd::ParameterMapping;

fn main() {
    let crd = ParameterMapping::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
