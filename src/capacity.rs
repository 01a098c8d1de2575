use crate::entities::LoadAssignment;

/// Share of a vehicle's volume committed by its active load assignments, in
/// percent, capped at 100 and rounded to two decimals.
pub fn cargo_percentage(volume: f64, assignments: &[LoadAssignment]) -> f64 {
    if !(volume > 0.0) {
        return 0.0;
    }

    let committed: f64 = assignments
        .iter()
        .filter(|assignment| assignment.is_active())
        .map(|assignment| assignment.volume_used.max(0.0))
        .sum();

    let percentage = (100.0 * committed / volume).min(100.0);

    (percentage * 100.0).round() / 100.0
}

#[cfg(test)]
fn assignment(volume_used: f64, status: crate::entities::AssignmentStatus) -> LoadAssignment {
    LoadAssignment {
        load_id: uuid::Uuid::new_v4(),
        volume_used,
        status,
    }
}

#[test]
fn only_active_assignments_count_test() {
    use crate::entities::AssignmentStatus;

    let assignments = vec![
        assignment(10.0, AssignmentStatus::Active),
        assignment(20.0, AssignmentStatus::Delivered),
        assignment(5.0, AssignmentStatus::Canceled),
        assignment(2.5, AssignmentStatus::Active),
    ];

    assert_eq!(cargo_percentage(50.0, &assignments), 25.0);
}

#[test]
fn percentage_is_capped_and_rounded_test() {
    use crate::entities::AssignmentStatus;

    let over = vec![
        assignment(80.0, AssignmentStatus::Active),
        assignment(40.0, AssignmentStatus::Active),
    ];
    assert_eq!(cargo_percentage(100.0, &over), 100.0);

    let third = vec![assignment(1.0, AssignmentStatus::Active)];
    assert_eq!(cargo_percentage(3.0, &third), 33.33);
}

#[test]
fn degenerate_volume_test() {
    use crate::entities::AssignmentStatus;

    let assignments = vec![assignment(10.0, AssignmentStatus::Active)];

    assert_eq!(cargo_percentage(0.0, &assignments), 0.0);
    assert_eq!(cargo_percentage(-4.0, &assignments), 0.0);
    assert_eq!(cargo_percentage(f64::NAN, &assignments), 0.0);
    assert_eq!(cargo_percentage(10.0, &[]), 0.0);
}
