mod common;

use common::{ctx, target, Harness};
use spycat_core::{Entity, ErrorKind, MissionValidationError, ServiceError, ValidationError};

#[tokio::test]
async fn create_mission_requires_one_to_three_targets() {
    let h = Harness::in_memory();

    let err = h.missions.create_mission(&ctx(), Vec::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::Mission(MissionValidationError::TargetCount(0)))
    ));

    let four = (0..4).map(|i| target(&format!("t{i}"))).collect();
    let err = h.missions.create_mission(&ctx(), four).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    for count in 1..=3 {
        let targets = (0..count).map(|i| target(&format!("t{i}"))).collect();
        let mission = h.missions.create_mission(&ctx(), targets).await.unwrap();
        assert_eq!(mission.targets.len(), count);
        assert!(mission.targets.iter().all(|t| t.mission_id == mission.id));
        assert_eq!(mission.assignee, None);
        assert!(!mission.completed);
    }
    assert_eq!(h.missions.list_missions(&ctx()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn assign_then_reassign_moves_cat() {
    let h = Harness::in_memory();
    let cat = h.cat("Tom").await;
    let first = h.mission(1).await;
    let second = h.mission(2).await;

    let assigned = h.missions.assign_cat(&ctx(), first, cat).await.unwrap();
    assert_eq!(assigned.assignee, Some(cat));
    assert_eq!(assigned.targets.len(), 1);

    let moved = h.missions.assign_cat(&ctx(), second, cat).await.unwrap();
    assert_eq!(moved.id, second);
    assert_eq!(moved.assignee, Some(cat));
    assert_eq!(moved.targets.len(), 2);

    let released = h.missions.get_mission(&ctx(), first).await.unwrap();
    assert_eq!(released.assignee, None);
}

#[tokio::test]
async fn reassigning_to_current_mission_writes_nothing() {
    let h = Harness::in_memory();
    let cat = h.cat("Tom").await;
    let mission = h.mission(1).await;
    let assigned = h.missions.assign_cat(&ctx(), mission, cat).await.unwrap();

    let before = h.db.total_changes().unwrap();
    let again = h.missions.assign_cat(&ctx(), mission, cat).await.unwrap();
    assert_eq!(h.db.total_changes().unwrap(), before);
    assert_eq!(again, assigned);
}

#[tokio::test]
async fn missing_cat_and_missing_mission_are_distinguished() {
    let h = Harness::in_memory();
    let cat = h.cat("Tom").await;
    let mission = h.mission(1).await;

    let err = h.missions.assign_cat(&ctx(), mission, 77).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Entity::Cat(77))));

    let err = h.missions.assign_cat(&ctx(), 88, cat).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Entity::Mission(88))));

    let untouched = h.missions.get_mission(&ctx(), mission).await.unwrap();
    assert_eq!(untouched.assignee, None);
}

#[tokio::test]
async fn completed_mission_cannot_be_assigned() {
    let h = Harness::in_memory();
    let cat = h.cat("Tom").await;
    let mission = h.missions.create_mission(&ctx(), vec![target("a")]).await.unwrap();
    h.targets
        .complete_target(&ctx(), mission.targets[0].id)
        .await
        .unwrap();
    h.missions.complete_mission(&ctx(), mission.id).await.unwrap();

    let err = h.missions.assign_cat(&ctx(), mission.id, cat).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::MissionCompleted(id)) if id == mission.id
    ));
}

#[tokio::test]
async fn cat_with_completed_mission_can_take_a_new_one() {
    let h = Harness::in_memory();
    let cat = h.cat("Tom").await;
    let done = h.missions.create_mission(&ctx(), vec![target("a")]).await.unwrap();
    h.missions.assign_cat(&ctx(), done.id, cat).await.unwrap();
    h.targets
        .complete_target(&ctx(), done.targets[0].id)
        .await
        .unwrap();
    h.missions.complete_mission(&ctx(), done.id).await.unwrap();

    let next = h.mission(1).await;
    h.missions.assign_cat(&ctx(), next, cat).await.unwrap();

    let history = h.missions.get_mission(&ctx(), done.id).await.unwrap();
    assert_eq!(history.assignee, Some(cat));
    assert!(history.completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_leave_exactly_one_active_mission() {
    let h = Harness::on_disk(4);
    let cat = h.cat("Tom").await;
    let mut missions = Vec::new();
    for _ in 0..6 {
        missions.push(h.mission(1).await);
    }

    let mut handles = Vec::new();
    for mission in missions.clone() {
        let service = h.missions.clone();
        handles.push(tokio::spawn(async move {
            service.assign_cat(&ctx(), mission, cat).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = h.missions.list_missions(&ctx()).await.unwrap();
    let active: Vec<_> = all
        .iter()
        .filter(|mission| mission.assignee == Some(cat) && !mission.completed)
        .collect();
    assert_eq!(active.len(), 1);
    assert!(missions.contains(&active[0].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assignments_of_different_cats_to_one_mission_keep_one_assignee() {
    let h = Harness::on_disk(4);
    let mission = h.mission(1).await;
    let mut cats = Vec::new();
    for index in 0..4 {
        cats.push(h.cat(&format!("cat-{index}")).await);
    }

    let mut handles = Vec::new();
    for cat in cats.clone() {
        let service = h.missions.clone();
        handles.push(tokio::spawn(async move {
            service.assign_cat(&ctx(), mission, cat).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let loaded = h.missions.get_mission(&ctx(), mission).await.unwrap();
    let assignee = loaded.assignee.expect("mission should be assigned");
    assert!(cats.contains(&assignee));
}

#[tokio::test]
async fn assigned_mission_cannot_be_deleted() {
    let h = Harness::in_memory();
    let cat = h.cat("Tom").await;
    let assigned = h.mission(2).await;
    let free = h.mission(1).await;
    h.missions.assign_cat(&ctx(), assigned, cat).await.unwrap();

    let err = h.missions.delete_mission(&ctx(), assigned).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::MissionAssigned { assignee, .. }) if assignee == cat
    ));

    h.missions.delete_mission(&ctx(), free).await.unwrap();
    let err = h.missions.get_mission(&ctx(), free).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(Entity::Mission(id)) if id == free));

    let err = h.missions.delete_mission(&ctx(), free).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn list_missions_groups_interleaved_targets() {
    let h = Harness::in_memory();
    let first = h.mission(1).await;
    let empty = h.mission(1).await;
    let second = h.mission(1).await;
    h.targets
        .add_target(&ctx(), first, target("late-first"))
        .await
        .unwrap();
    let emptied = h.missions.get_mission(&ctx(), empty).await.unwrap();
    h.targets
        .delete_target(&ctx(), emptied.targets[0].id)
        .await
        .unwrap();

    let all = h.missions.list_missions(&ctx()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|mission| mission.id).collect();
    assert_eq!(ids, vec![first, empty, second]);

    assert_eq!(all[0].targets.len(), 2);
    assert_eq!(all[0].targets[1].name, "late-first");
    assert!(all[0].targets[0].id < all[0].targets[1].id);
    assert!(all[1].targets.is_empty());
    assert_eq!(all[2].targets.len(), 1);
    assert!(all
        .iter()
        .all(|mission| mission.targets.iter().all(|t| t.mission_id == mission.id)));
}
