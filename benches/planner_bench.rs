use std::collections::BTreeSet;
use std::hint::black_box;
use std::sync::Arc;

use capmatch::{
    Catalogue, CompositionPlanner, Concept, DiscoveryMode, ExecutorConfig, InMemoryCatalogue,
    LogicMatchType, Operation, OperationDiscoverer, PlannerConfig, Service,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use matcher::demo_utils::TableMatcher;

/// `width` independent chains of `depth` steps, all rooted at `seed`.
fn grid(width: usize, depth: usize) -> Arc<dyn Catalogue> {
    let services = (0..width).map(|w| {
        let mut service = Service::new(format!("svc:{w}"));
        for d in 0..depth {
            let input = if d == 0 {
                "seed".to_string()
            } else {
                format!("c{w}_{}", d - 1)
            };
            service = service.with_operation(Operation::new(
                format!("op{w}_{d}"),
                "",
                [Concept::new(input)],
                [Concept::new(format!("c{w}_{d}"))],
            ));
        }
        service
    });
    Arc::new(InMemoryCatalogue::from_services(services).expect("grid catalogue"))
}

fn seed() -> BTreeSet<Concept> {
    [Concept::new("seed")].into()
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("planner_search");
    let catalogue = grid(32, 8);
    group.throughput(Throughput::Elements(32 * 8));

    for (label, executor) in [
        ("sequential", ExecutorConfig::default()),
        ("parallel_4", ExecutorConfig::parallel(4)),
    ] {
        let planner: CompositionPlanner = CompositionPlanner::new(
            Arc::new(TableMatcher::new()),
            catalogue.clone(),
            PlannerConfig::default().with_executor(executor),
        )
        .expect("planner");
        group.bench_function(label, |b| {
            b.iter(|| {
                planner
                    .search(black_box(&seed()), LogicMatchType::Exact)
                    .expect("search")
            })
        });
    }
    group.finish();
}

fn bench_build_graph(c: &mut Criterion) {
    let planner: CompositionPlanner = CompositionPlanner::new(
        Arc::new(TableMatcher::new()),
        grid(16, 8),
        PlannerConfig::default(),
    )
    .expect("planner");
    let plan = planner
        .search(&seed(), LogicMatchType::Exact)
        .expect("search");

    c.bench_function("build_graph_16x8", |b| {
        b.iter(|| {
            planner
                .build_graph(black_box(&plan.layers), LogicMatchType::Exact)
                .expect("graph")
        })
    });
}

fn bench_discovery(c: &mut Criterion) {
    let discoverer: OperationDiscoverer = OperationDiscoverer::new(
        Arc::new(TableMatcher::new()),
        grid(32, 8),
        ExecutorConfig::default(),
    )
    .expect("discoverer");
    let range = LogicMatchType::types().at_least(LogicMatchType::Exact);
    let wanted: BTreeSet<Concept> = [Concept::new("c7_7"), Concept::new("c3_2")].into();

    c.bench_function("find_operations_producing", |b| {
        b.iter(|| {
            discoverer
                .find_operations_producing(black_box(&wanted), &range, DiscoveryMode::Any)
                .expect("discover")
        })
    });
}

criterion_group!(benches, bench_search, bench_build_graph, bench_discovery);
criterion_main!(benches);
