use super::utils::{keys, populate};
use criterion::{criterion_group, BatchSize, Criterion};

#[cfg(not(full_bench))]
const N_ITEMS: [usize; 2] = [10_000, 50_000];
#[cfg(full_bench)]
const N_ITEMS: [usize; 4] = [10_000, 50_000, 100_000, 500_000];

const CAPACITIES: [usize; 3] = [16, 128, 1024];

fn bench_put(c: &mut Criterion) {
    for order in ["ascending", "descending", "random"] {
        for capacity in CAPACITIES {
            for items in N_ITEMS {
                let label = format!(
                    "{}/order={order} capacity={capacity} items={items}",
                    module_path!()
                );
                c.bench_function(&label, |b| {
                    b.iter_batched(
                        || keys(items, order),
                        |keys| populate(capacity, &keys),
                        BatchSize::SmallInput,
                    )
                });
            }
        }
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_put
}
