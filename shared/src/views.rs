//! Read-only projections of the cache. Recomputed on demand, never memoized.

use crate::model::Activity;

/// A `yyyy-MM-dd` key and the activities on that day.
pub type DayGroup = (String, Vec<Activity>);

/// Ascending by date; same-instant activities fall back to id order so the
/// result does not depend on map iteration order.
pub fn activities_by_date<'a, I>(activities: I) -> Vec<Activity>
where
    I: IntoIterator<Item = &'a Activity>,
{
    let mut sorted: Vec<Activity> = activities.into_iter().cloned().collect();
    sorted.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    sorted
}

/// Buckets an already date-sorted list by calendar day, keeping its order.
pub fn group_by_day(sorted: Vec<Activity>) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();

    for activity in sorted {
        let key = activity.day_key();
        if let Some((day, bucket)) = groups.last_mut() {
            if *day == key {
                bucket.push(activity);
                continue;
            }
        }
        groups.push((key, vec![activity]));
    }

    groups
}

pub fn grouped_activities<'a, I>(activities: I) -> Vec<DayGroup>
where
    I: IntoIterator<Item = &'a Activity>,
{
    group_by_day(activities_by_date(activities))
}
