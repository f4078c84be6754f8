use std::collections::{BTreeMap, VecDeque};

use crate::domain::{Priority, TaskId};

/// One FIFO lane per priority level. Lanes hold IDs only; the records live
/// in the manager's active table.
#[derive(Debug, Default)]
pub(crate) struct PriorityLanes {
    lanes: [VecDeque<TaskId>; Priority::COUNT],
}

impl PriorityLanes {
    pub(crate) fn push_back(&mut self, priority: Priority, task_id: TaskId) {
        self.lanes[priority.lane()].push_back(task_id);
    }

    pub(crate) fn push_front(&mut self, priority: Priority, task_id: TaskId) {
        self.lanes[priority.lane()].push_front(task_id);
    }

    /// Pop from the most urgent non-empty lane.
    pub(crate) fn pop_highest(&mut self) -> Option<(Priority, TaskId)> {
        Priority::DESCENDING.into_iter().find_map(|priority| {
            self.lanes[priority.lane()]
                .pop_front()
                .map(|task_id| (priority, task_id))
        })
    }

    pub(crate) fn remove(&mut self, priority: Priority, task_id: TaskId) -> bool {
        let lane = &mut self.lanes[priority.lane()];
        match lane.iter().position(|id| *id == task_id) {
            Some(pos) => lane.remove(pos).is_some(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    pub(crate) fn depths(&self) -> BTreeMap<Priority, usize> {
        Priority::DESCENDING
            .into_iter()
            .map(|p| (p, self.lanes[p.lane()].len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    #[test]
    fn pops_most_urgent_first_then_fifo() {
        let mut lanes = PriorityLanes::default();
        let (low, n1, n2, crit) = (id(), id(), id(), id());
        lanes.push_back(Priority::Low, low);
        lanes.push_back(Priority::Normal, n1);
        lanes.push_back(Priority::Normal, n2);
        lanes.push_back(Priority::Critical, crit);

        assert_eq!(lanes.pop_highest(), Some((Priority::Critical, crit)));
        assert_eq!(lanes.pop_highest(), Some((Priority::Normal, n1)));
        assert_eq!(lanes.pop_highest(), Some((Priority::Normal, n2)));
        assert_eq!(lanes.pop_highest(), Some((Priority::Low, low)));
        assert_eq!(lanes.pop_highest(), None);
    }

    #[test]
    fn push_front_jumps_the_lane() {
        let mut lanes = PriorityLanes::default();
        let (a, b) = (id(), id());
        lanes.push_back(Priority::High, a);
        lanes.push_front(Priority::High, b);
        assert_eq!(lanes.pop_highest(), Some((Priority::High, b)));
    }

    #[test]
    fn remove_and_depths() {
        let mut lanes = PriorityLanes::default();
        let (a, b) = (id(), id());
        lanes.push_back(Priority::Urgent, a);
        lanes.push_back(Priority::Urgent, b);
        assert!(lanes.remove(Priority::Urgent, a));
        assert!(!lanes.remove(Priority::Urgent, a));
        assert_eq!(lanes.len(), 1);
        assert_eq!(lanes.depths()[&Priority::Urgent], 1);
        assert_eq!(lanes.depths()[&Priority::Low], 0);
        assert!(!lanes.is_empty());
    }
}
